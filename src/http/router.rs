//! Router construction for the item lifecycle API.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use super::{handlers, identity, AppState};

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Routes that need a resolved caller
    let protected = Router::new()
        .route("/projects", post(handlers::create_project))
        .route("/projects/:id/advance", post(handlers::advance))
        .route("/projects/:id/back", post(handlers::move_back))
        .route("/projects/:id/workflow", get(handlers::workflow))
        .route("/projects/:id/audit", get(handlers::audit_log))
        .route("/permissions", get(handlers::list_permissions))
        .route(
            "/roles/:id/permissions",
            get(handlers::role_permissions).put(handlers::replace_role_permissions),
        )
        .layer(axum_mw::from_fn(identity::resolve_caller));

    // Public routes (no auth)
    let public = Router::new().route("/health", get(handlers::health));

    public
        .merge(protected)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
