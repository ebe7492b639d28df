use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "trailstop")]
#[command(about = "Trend-following trailing-stop controller for a single instrument", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller with the price stream and status API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: PathBuf,
        /// Profile overlay, e.g. `paper` loads Config.paper.toml
        #[arg(short, long, env = "TRAILSTOP_PROFILE")]
        profile: Option<String>,
        /// Optional log file path (logs to file instead of stderr)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the persisted position checkpoint
    Inspect {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: PathBuf,
        #[arg(short, long, env = "TRAILSTOP_PROFILE")]
        profile: Option<String>,
    },
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            profile,
            log_file,
        } => {
            init_logging(log_file.as_ref())?;
            commands::run(&config, profile.as_deref()).await?;
        }
        Commands::Inspect { config, profile } => {
            init_logging(None)?;
            commands::inspect(&config, profile.as_deref()).await?;
        }
    }

    Ok(())
}
