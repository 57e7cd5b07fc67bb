use anyhow::Result;
use clap::Parser;

use item_lifecycle::cli::commands::{seed::SeedCommand, serve::ServeCommand, stages::StagesCommand};
use item_lifecycle::cli::{Cli, Commands};
use item_lifecycle::config::{config, ObservabilityConfig};
use item_lifecycle::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Stages { lifecycle, json } => runtime.block_on(async {
            StagesCommand::new(lifecycle).with_json(json).execute().await
        }),
        Commands::Serve { bind, memory } => runtime.block_on(async {
            let config = config()?;
            init_telemetry(&config.observability)?;
            let result = ServeCommand::new()
                .with_bind(bind)
                .with_memory(memory)
                .execute(config)
                .await;
            shutdown_telemetry();
            result
        }),
        Commands::Seed {
            admin_email,
            admin_name,
        } => runtime.block_on(async {
            let config = config()?;
            init_telemetry(&ObservabilityConfig {
                log_level: "warn".to_string(),
                json_logs: config.observability.json_logs,
            })?;
            SeedCommand::new(admin_name)
                .with_admin_email(admin_email)
                .execute(config)
                .await
        }),
    }
}
