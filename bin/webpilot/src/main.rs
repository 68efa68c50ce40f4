mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use webpilot_core::Config;

#[derive(Parser)]
#[command(name = "webpilot", version, about = "Sandboxed browser agent gateway")]
struct Cli {
    /// Path to the config file (default: ~/.webpilot/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP gateway
    Gateway {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Execute a single task and print the result
    Run {
        /// The task for the agent
        task: String,
        /// Managed sandbox session id
        #[arg(long)]
        session_id: Option<String>,
        /// Direct sandbox WebSocket endpoint
        #[arg(long)]
        cdp_ws_url: Option<String>,
        /// Sandbox provider: managed or direct
        #[arg(long)]
        provider: Option<String>,
        /// Print the full JSON response instead of plain text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Gateway { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            commands::gateway::run_gateway(config).await
        }
        Commands::Run {
            task,
            session_id,
            cdp_ws_url,
            provider,
            json,
        } => commands::run_cmd::run_task(config, task, session_id, cdp_ws_url, provider, json).await,
    }
}
