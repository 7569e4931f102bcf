mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "trafficlens")]
#[command(about = "Chat with an AI assistant about your browser's network traffic", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize trafficlens configuration
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration status
    Status,

    /// Start the capture gateway (long-running daemon)
    Gateway {
        /// Port to listen on (overrides config gateway.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,
    },

    /// List captured network calls from a running gateway
    Calls {
        /// Max calls to show
        #[arg(long)]
        limit: Option<usize>,

        /// Only show calls that received a response
        #[arg(long)]
        completed: bool,
    },

    /// Turn recording on or off
    Record {
        /// "on" or "off"
        state: String,
    },

    /// Clear all captured network calls
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Gateway { port, host } => {
            commands::gateway::run(host, port).await?;
        }
        Commands::Calls { limit, completed } => {
            commands::calls::run(limit, completed).await?;
        }
        Commands::Record { state } => {
            let enabled = match state.as_str() {
                "on" => true,
                "off" => false,
                other => anyhow::bail!("expected 'on' or 'off', got '{}'", other),
            };
            commands::record::run(enabled).await?;
        }
        Commands::Clear => {
            commands::clear::run().await?;
        }
    }

    Ok(())
}
