use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::auth::roles;
use crate::domain::User;
use crate::store::{DirectoryStore, PermissionStore};

pub mod seed;
pub mod serve;
pub mod stages;

/// Create a user holding the Admin role. The catalog must already be seeded.
pub async fn create_admin_user<S>(store: &S, name: &str, email: &str) -> Result<User>
where
    S: PermissionStore + DirectoryStore + ?Sized,
{
    let role = store
        .find_role_by_name(roles::ADMIN)
        .await?
        .ok_or_else(|| anyhow!("{} role is missing; run the seed first", roles::ADMIN))?;
    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        role_id: role.id,
    };
    store.insert_user(&user).await?;
    Ok(user)
}
