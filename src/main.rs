use std::path::PathBuf;

use clap::{Parser, Subcommand};

use service_mesh::config::load_or_default;
use service_mesh::lifecycle::{self, startup, Component, Shutdown};
use service_mesh::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "service-mesh")]
#[command(about = "Registry, config server, gateway and service instance", long_about = None)]
struct Cli {
    /// Path to the mesh configuration file; defaults apply when it is missing.
    #[arg(short, long, default_value = "mesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service registry
    Registry,
    /// Run the config server
    ConfigServer,
    /// Run the API gateway
    Gateway,
    /// Run a service instance with the built-in endpoints only
    Instance,
    /// Run every component in one process
    All,
}

impl From<Commands> for Component {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Registry => Component::Registry,
            Commands::ConfigServer => Component::ConfigServer,
            Commands::Gateway => Component::Gateway,
            Commands::Instance => Component::Instance,
            Commands::All => Component::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    init_logging(&config.observability.log_level);
    let component = Component::from(cli.command);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        component = ?component,
        config = %cli.config.display(),
        "service-mesh starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(lifecycle::shutdown_on_signal(shutdown.clone()));

    startup::run(component, config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
