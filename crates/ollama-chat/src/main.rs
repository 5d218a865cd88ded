//! ollama-chat: chat with a local or hosted LLM from the terminal
//!
//! The terminal plays the role of the command sender: every console line is
//! dispatched like an in-game `/ollama` command.

mod commands;
mod console;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ollama-chat")]
#[command(about = "Relay chat messages to Ollama or a hosted API", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.toml
    #[arg(long, global = true, env = "OLLAMA_CHAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive console (default)
    Console,

    /// One-shot message; waits for the full reply
    Ask {
        /// The message to send
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Download a model with the built-in executable
    Pull {
        /// Model name to pull
        name: String,
    },

    /// Run the built-in Ollama server until Ctrl-C
    Serve,

    /// Write the default config file if missing
    Init,
}

/// `--config`, else `<config dir>/ollama-chat/config.toml`
fn config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }

    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("ollama-chat").join("config.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = config_path(&cli)?;
    debug!(config = %path.display(), "Using config");

    match cli.command {
        Some(Commands::Console) | None => console::run(&path).await,
        Some(Commands::Ask { prompt }) => commands::ask(&path, &prompt.join(" ")).await,
        Some(Commands::Pull { name }) => commands::pull(&path, &name).await,
        Some(Commands::Serve) => commands::serve(&path).await,
        Some(Commands::Init) => commands::init(&path),
    }
}
