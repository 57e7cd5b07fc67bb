use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "item-lifecycle")]
#[command(about = "Item lifecycle workflow service")]
#[command(long_about = "Runs the item lifecycle workflow API: linear stage workflows for new, \
                       transitioning and deleting items, gated by role permissions. Start with \
                       'item-lifecycle seed' and then 'item-lifecycle serve'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the lifecycle event dispatcher
    Serve {
        /// Address to bind, overriding server.bind_addr
        #[arg(long, help = "Socket address to listen on, e.g. 0.0.0.0:8080")]
        bind: Option<String>,
        /// Keep all state in memory instead of the configured database
        #[arg(long, help = "Use a throwaway in-memory store seeded with the default catalog")]
        memory: bool,
    },
    /// Print the stage registry
    Stages {
        /// Lifecycle type to print; all of them when omitted
        #[arg(help = "NEW_ITEM, TRANSITIONING_ITEM or DELETING_ITEM")]
        lifecycle: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long, help = "Print the registry as JSON")]
        json: bool,
    },
    /// Install the default permission catalog and roles
    Seed {
        /// Also create an admin user with this email
        #[arg(long, help = "Create an Admin user with this email address")]
        admin_email: Option<String>,
        /// Display name for the admin user
        #[arg(long, default_value = "Administrator", help = "Display name of the created admin")]
        admin_name: String,
    },
}
