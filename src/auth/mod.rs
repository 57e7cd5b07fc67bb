// Role-permission authorization: caller identity, catalog and gate

pub mod caller;
pub mod catalog;
pub mod gate;

pub use caller::Caller;
pub use catalog::{permissions, roles, seed_defaults, SeedReport};
pub use gate::{stage_owner_decision, AuthorizationGate, Decision, OwnershipPolicy};
