//! `lmp` — the linkmap probe agent. Enrolls via device code, then runs
//! a daemon that executes local scrapes on the coordinator's behalf.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod daemon;
mod login;
mod scrape;
mod sse;
mod state;

use state::StateDir;

#[derive(Parser)]
#[command(name = "lmp")]
#[command(about = "linkmap probe agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll this machine with a coordinator
    Login {
        /// Coordinator base URL, e.g. https://app.example.com
        #[arg(long)]
        api_base: String,
    },

    /// Start the probe daemon
    Run {
        /// Stay attached to the terminal instead of daemonizing
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show whether the daemon is running
    Status,

    /// Forget the stored access token
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lmp=info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let state_dir = StateDir::default_location()?;

    match cli.command {
        Commands::Login { api_base } => login::login(&state_dir, &api_base).await,
        Commands::Run { foreground } => {
            if foreground {
                let config = state_dir
                    .load_config()?
                    .ok_or_else(|| anyhow::anyhow!("not logged in; run `lmp login` first"))?;
                daemon::run_foreground(&state_dir, config).await
            } else {
                daemon::spawn_background(&state_dir)
            }
        }
        Commands::Stop => daemon::stop(&state_dir),
        Commands::Status => {
            daemon::status(&state_dir);
            Ok(())
        }
        Commands::Logout => {
            if state_dir.clear_token()? {
                println!("logged out");
            } else {
                println!("no stored credentials");
            }
            Ok(())
        }
    }
}
