use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depth_interview::{
    cache::{ExpiringStore, InMemoryStore},
    config::{Config, LogFormat},
    gateway::GatewayClient,
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

#[derive(Parser, Debug)]
#[command(name = "depth-interview")]
#[command(about = "AI depth-interview pipeline served over MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// Print a campaign's aggregate as JSON
    Aggregate {
        /// Campaign ID
        #[arg(long)]
        campaign: String,
    },

    /// Print a campaign export as JSON
    Export {
        /// Campaign ID
        #[arg(long)]
        campaign: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Depth interview engine starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let store: Arc<dyn ExpiringStore> =
        Arc::new(InMemoryStore::new(config.rate_limit.cache_max_entries));

    let gateway = match GatewayClient::new(&config.gateway, config.request.clone(), store.clone())
    {
        Ok(c) => {
            info!(base_url = %c.base_url(), model = %c.model(), "Gateway client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize gateway client");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(config, storage, gateway, store));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let server = McpServer::new(state);
            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
            info!("Server shutdown complete");
        }
        Commands::Aggregate { campaign } => {
            let aggregate = state.campaigns.aggregate(&campaign).await?;
            println!("{}", serde_json::to_string_pretty(&aggregate)?);
        }
        Commands::Export { campaign } => {
            let export = state.campaigns.export(&campaign).await?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
    }

    Ok(())
}

/// Initialize tracing/logging. Logs go to stderr; stdout carries protocol
/// traffic.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
