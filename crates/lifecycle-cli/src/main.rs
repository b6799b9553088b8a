mod cmd;
mod output;
mod settings;
mod wiring;

use clap::{Parser, Subcommand, ValueEnum};
use cmd::{config::ConfigSubcommand, operations::OperationsSubcommand, repos::ReposSubcommand};
use settings::Overrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lifecycle",
    about = "SaaS lifecycle coordinator: dispatch tenant operations to workflows and track them to completion",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML settings file (default: built-in defaults)
    #[arg(long, global = true, env = "LIFECYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the request API and run the refresh, reconcile, and expire loops
    Serve {
        /// Address to bind (overrides `listen` in the settings file)
        #[arg(long, env = "LIFECYCLE_LISTEN")]
        listen: Option<String>,
    },

    /// Rebuild the repo directory from the backend once
    Refresh,

    /// Resolve pending operations against completed runs once
    Reconcile,

    /// Time out stale pending operations once
    Expire {
        /// Expiration threshold in hours (overrides the settings value)
        #[arg(long, allow_negative_numbers = true)]
        ttl_hours: Option<i64>,
    },

    /// Inspect pending operation records
    Operations {
        #[command(subcommand)]
        subcommand: OperationsSubcommand,
    },

    /// Inspect the cached repo directory
    Repos {
        #[command(subcommand)]
        subcommand: ReposSubcommand,
    },

    /// Validate the effective settings
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Refresh | Commands::Reconcile | Commands::Expire { .. } => {
            tracing::Level::INFO
        }
        _ => tracing::Level::WARN,
    };
    let filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into());
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let result = settings::resolve(cli.config.as_deref(), &cli.overrides).and_then(|settings| {
        match cli.command {
            Commands::Serve { listen } => cmd::serve::run(settings, listen),
            Commands::Refresh => cmd::sweep::refresh(&settings, cli.json),
            Commands::Reconcile => cmd::sweep::reconcile(&settings, cli.json),
            Commands::Expire { ttl_hours } => cmd::sweep::expire(&settings, ttl_hours, cli.json),
            Commands::Operations { subcommand } => {
                cmd::operations::run(&settings, subcommand, cli.json)
            }
            Commands::Repos { subcommand } => cmd::repos::run(&settings, subcommand, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&settings, subcommand, cli.json),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
