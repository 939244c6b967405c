//! c87: command-line client for the C87 feed
//!
//! Wires the sync core to a live API server. Configuration comes from a TOML
//! file, then `C87_*` environment variables, then command-line flags.

mod commands;

use clap::Parser;
use tracing::info;

use c87_sync::{SyncConfig, SyncRuntime};
use commands::Command;

#[derive(Parser)]
#[command(name = "c87")]
#[command(about = "Read, vote on and spend tokens against the C87 news feed")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "c87.toml")]
    config: String,

    /// API base URL (overrides config file)
    #[arg(long, env = "C87_API_BASE_URL")]
    base_url: Option<String>,

    /// API key (overrides config file)
    #[arg(long, env = "C87_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("c87_cli=info".parse()?)
                .add_directive("c87_sync=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SyncConfig::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    if let Some(api_key) = cli.api_key.filter(|k| !k.trim().is_empty()) {
        config.api.api_key = Some(api_key);
    }

    info!("API: {}", config.api.base_url);

    let runtime = SyncRuntime::connect(config)?;
    commands::execute(&runtime, cli.command).await
}
