//! holdctl - command-line interface for Hold
//!
//! Operators use it to:
//! - Create, inspect and remove namespaces
//! - Create cargoes and replace their specs
//! - Browse spec history and revert to an earlier spec

use clap::{Parser, Subcommand};
use hold_registry::{CargoRegistry, NamespaceRegistry};
use hold_store::postgres::PostgresHoldStorage;
use hold_store::HoldStorage;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod output;

use commands::{cargo, namespace, Registries};
use config::{HoldConfig, LoggingConfig, StorageConfig};
use error::{CliError, CliResult};

/// Hold CLI application
#[derive(Parser)]
#[command(name = "holdctl")]
#[command(about = "Hold - versioned cargo spec store", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HOLD_CONFIG")]
    config: Option<String>,

    /// PostgreSQL URL; selects the postgres backend
    #[arg(long, env = "HOLD_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "HOLD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    log_json: bool,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Manage namespaces
    #[command(alias = "ns")]
    Namespace {
        #[command(subcommand)]
        command: namespace::NamespaceCommands,
    },

    /// Manage cargoes and their spec history
    Cargo {
        #[command(subcommand)]
        command: cargo::CargoCommands,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        output::print_error(&err.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = HoldConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(url) = cli.database_url {
        config.storage = config.storage.with_database_url(url);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    if let Commands::Config = cli.command {
        return output::print_single(&config, cli.output);
    }

    let storage = connect(&config.storage).await?;
    let registries = Registries {
        namespaces: NamespaceRegistry::new(storage.clone()),
        cargoes: CargoRegistry::new(storage, config.registry.clone()),
    };

    match cli.command {
        Commands::Namespace { command } => namespace::execute(command, &registries, cli.output).await,
        Commands::Cargo { command } => cargo::execute(command, &registries, cli.output).await,
        Commands::Config => Ok(()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    // Logs go to stderr so command output stays machine readable.
    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(storage: &StorageConfig) -> CliResult<Arc<dyn HoldStorage>> {
    match storage {
        // Each run is its own process, so an in-memory store would forget
        // every write before the next command could read it.
        StorageConfig::Memory => Err(CliError::Config(
            "namespace and cargo commands need persistent storage; pass --database-url \
             or set storage.type = \"postgres\""
                .to_string(),
        )),
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store =
                PostgresHoldStorage::connect_with_options(url, *max_connections, *connect_timeout_secs)
                    .await?;
            info!(max_connections, "Connected to postgres");
            Ok(Arc::new(store))
        }
    }
}
