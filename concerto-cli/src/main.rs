//! # concerto CLI
//!
//! Command-line interface for the concerto synchronization engine.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "concerto")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "concerto.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rule file and print its rule graph
    Check {
        /// Rule file (concept catalog + rules)
        rules: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run requests through the in-memory friends demo
    Demo {
        /// YAML list of requests (defaults to a built-in script)
        #[arg(long)]
        script: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Check { rules, json } => commands::check_rules(&config, &rules, json),
        Commands::Demo { script } => commands::run_demo(config, script.as_deref()).await,
    }
}
