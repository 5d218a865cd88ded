//! Non-interactive subcommands

use crate::console::ConsoleRecipient;
use anyhow::{bail, Result};
use chat_core::{ChatService, ConfigStore, Mode, Recipient};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RESET: &str = "\x1b[0m";

const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the service and, in built-in mode, wait for the server to answer
async fn ready_service(config_path: &Path) -> Result<ChatService> {
    let config = ConfigStore::open(config_path)?;
    let built_in = config.mode() == Mode::BuiltIn;
    let mut service = ChatService::new(config);

    if built_in && service.is_serving() && !service.wait_until_ready(READY_TIMEOUT).await {
        eprintln!(
            "{}Warning:{} built-in Ollama server is not responding yet",
            YELLOW, RESET
        );
    }

    Ok(service)
}

/// Send one message and print the reply with the typing effect
pub async fn ask(config_path: &Path, prompt: &str) -> Result<()> {
    let mut service = ready_service(config_path).await?;
    let recipient: Arc<dyn Recipient> = Arc::new(ConsoleRecipient::new());

    let reply = service.send_request(prompt).await;
    let delivery = service.show_typing_effect(recipient, &reply);
    finish_delivery(delivery).await;

    service.shutdown().await;
    Ok(())
}

/// Wait for the typing task; a failed task is logged, not propagated
async fn finish_delivery(delivery: JoinHandle<()>) {
    if let Err(e) = delivery.await {
        warn!(error = %e, "Reply delivery task failed");
    }
}

/// Download a model with progress
pub async fn pull(config_path: &Path, name: &str) -> Result<()> {
    let mut service = ready_service(config_path).await?;
    let recipient = ConsoleRecipient::new();

    service.download_model(&recipient, name).await;

    service.shutdown().await;
    Ok(())
}

/// Run the built-in server in the foreground
pub async fn serve(config_path: &Path) -> Result<()> {
    let config = ConfigStore::open(config_path)?;
    if config.mode() != Mode::BuiltIn {
        bail!("Mode is {}; run `setmode built-in` first", config.mode());
    }

    let mut service = ChatService::new(config);
    if !service.is_serving() {
        bail!("Failed to start the built-in Ollama server; run with -v for details");
    }

    println!(
        "{}Ollama started{} (PID {}), press Ctrl-C to stop",
        GREEN,
        RESET,
        service
            .server_pid()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    );

    tokio::signal::ctrl_c().await?;
    service.shutdown().await;
    println!("Ollama stopped");
    Ok(())
}

/// Write the default config and print where it lives
pub fn init(config_path: &Path) -> Result<()> {
    let existed = config_path.exists();
    let config = ConfigStore::open(config_path)?;

    if existed {
        println!("Config already exists: {}", config.path().display());
    } else {
        println!("{}Created{} {}", GREEN, RESET, config.path().display());
    }
    println!(
        "Built-in executable goes in {}",
        config.data_dir().join("ollama").display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finish_delivery_absorbs_panicked_task() {
        let delivery = tokio::spawn(async {
            panic!("recipient went away");
        });
        finish_delivery(delivery).await;
    }

    #[tokio::test]
    async fn test_finish_delivery_waits_for_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let delivery = tokio::spawn(async move {
            let _ = tx.send("typed");
        });
        finish_delivery(delivery).await;
        assert_eq!(rx.await.unwrap(), "typed");
    }
}
