use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::OwnershipPolicy;

/// Main configuration structure for the item lifecycle service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemLifecycleConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
    /// Transition rules
    pub workflow: WorkflowConfig,
    /// Lifecycle event dispatch
    pub outbox: OutboxConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds to
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Whether transitions also require owning the active stage
    pub ownership_policy: OwnershipPolicy,
    /// Reject unknown lifecycle type strings instead of falling back to NEW_ITEM
    pub strict_lifecycle_types: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboxConfig {
    /// Run the dispatcher alongside the HTTP server
    pub enabled: bool,
    /// Delay between polls when the outbox is empty
    pub poll_interval_ms: u64,
    /// Deliveries attempted before an event is dead-lettered
    pub max_attempts: u32,
    /// How long a claim is held before another worker may take the event over
    pub claim_lease_ms: u64,
    /// Claim owner recorded on rows; defaults to the host name
    pub worker_id: Option<String>,
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_millis(self.claim_lease_ms)
    }

    pub fn resolved_worker_id(&self) -> String {
        self.worker_id.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .map(|h| format!("{h}-{}", std::process::id()))
                .unwrap_or_else(|| format!("worker-{}", std::process::id()))
        })
    }
}

impl Default for ItemLifecycleConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "127.0.0.1:8080".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            database: Some(DatabaseConfig {
                url: "sqlite://item-lifecycle.db".to_string(),
                max_connections: 10,
                auto_migrate: true,
                busy_timeout_ms: 5_000,
            }),
            workflow: WorkflowConfig {
                ownership_policy: OwnershipPolicy::StageOwner,
                strict_lifecycle_types: true,
            },
            outbox: OutboxConfig {
                enabled: true,
                poll_interval_ms: 1_000,
                max_attempts: 5,
                claim_lease_ms: 30_000,
                worker_id: None,
            },
        }
    }
}

impl ItemLifecycleConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (item-lifecycle.toml, .item-lifecycle-rc)
    /// 3. Environment variables (prefixed with ITEM_LIFECYCLE_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&ItemLifecycleConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("item-lifecycle.toml").exists() {
            builder = builder.add_source(File::with_name("item-lifecycle"));
        }

        if Path::new(".item-lifecycle-rc").exists() {
            builder = builder.add_source(
                File::with_name(".item-lifecycle-rc").format(config::FileFormat::Toml),
            );
        }

        // ITEM_LIFECYCLE_WORKFLOW__OWNERSHIP_POLICY=coarse
        builder = builder.add_source(
            Environment::with_prefix("ITEM_LIFECYCLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ItemLifecycleConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ItemLifecycleConfig::load_env_file();
        ItemLifecycleConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ItemLifecycleConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict_with_stage_ownership() {
        let config = ItemLifecycleConfig::default();
        assert_eq!(config.workflow.ownership_policy, OwnershipPolicy::StageOwner);
        assert!(config.workflow.strict_lifecycle_types);
        assert_eq!(config.outbox.max_attempts, 5);
    }

    #[test]
    fn test_saved_file_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item-lifecycle.toml");

        let mut config = ItemLifecycleConfig::default();
        config.workflow.ownership_policy = OwnershipPolicy::Coarse;
        config.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ownership_policy = \"coarse\""));
        let parsed: ItemLifecycleConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.workflow.ownership_policy, OwnershipPolicy::Coarse);
    }

    #[test]
    fn test_explicit_worker_id_wins() {
        let mut config = ItemLifecycleConfig::default();
        config.outbox.worker_id = Some("dispatcher-a".to_string());
        assert_eq!(config.outbox.resolved_worker_id(), "dispatcher-a");
    }
}
