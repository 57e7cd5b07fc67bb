use anyhow::Result;

use crate::auth::seed_defaults;
use crate::config::ItemLifecycleConfig;

pub struct SeedCommand {
    pub admin_email: Option<String>,
    pub admin_name: String,
}

impl SeedCommand {
    pub fn new(admin_name: String) -> Self {
        Self {
            admin_email: None,
            admin_name,
        }
    }

    pub fn with_admin_email(mut self, email: Option<String>) -> Self {
        self.admin_email = email;
        self
    }

    #[cfg(feature = "database")]
    pub async fn execute(&self, config: &ItemLifecycleConfig) -> Result<()> {
        use crate::database::DatabaseManager;

        let db_config = config
            .database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No [database] section configured"))?;
        let manager = DatabaseManager::new(db_config).await?;
        let store = manager.store();
        // Seeding needs the schema even when auto_migrate is off
        store.migrate().await?;

        let report = seed_defaults(&store).await?;
        println!("🌱 Seeded {}", db_config.url);
        println!("   permissions created: {}", report.permissions_created);
        println!("   roles created:       {}", report.roles_created);
        println!("   roles granted:       {}", report.roles_granted);

        if let Some(email) = &self.admin_email {
            let user = super::create_admin_user(&store, &self.admin_name, email).await?;
            println!("👤 Admin user {} <{}>", user.name, user.email);
            println!("   X-User-Id: {}", user.id);
        }

        manager.shutdown().await;
        Ok(())
    }

    #[cfg(not(feature = "database"))]
    pub async fn execute(&self, _config: &ItemLifecycleConfig) -> Result<()> {
        anyhow::bail!("seed needs the 'database' feature; use 'serve --memory' instead")
    }
}
