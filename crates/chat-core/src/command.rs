//! Command entry point: `setmodel`, `setmode`, `download` and free-text chat

use crate::config::Mode;
use crate::recipient::Recipient;
use crate::service::ChatService;
use crate::typing;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const USAGE: &str =
    "Usage: ollama <message> | setmodel <model> | setmode <built-in|standalone> | download <model>";
pub const GENERATING: &str = "Generating...";

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Usage,
    SetModel(String),
    SetMode(String),
    Download(String),
    Chat(String),
}

impl Command {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let Some(first) = args.first() else {
            return Command::Usage;
        };
        let operand = args.get(1).map(|a| a.as_ref().to_string());

        match first.as_ref().to_lowercase().as_str() {
            "setmodel" => operand.map_or(Command::Usage, Command::SetModel),
            "setmode" => operand.map_or(Command::Usage, Command::SetMode),
            "download" => operand.map_or(Command::Usage, Command::Download),
            _ => {
                let text = args.iter().map(|a| a.as_ref()).collect::<Vec<&str>>().join(" ");
                Command::Chat(text)
            }
        }
    }
}

/// Dispatches commands from the single command context to the chat service
pub struct CommandHandler {
    service: ChatService,
}

impl CommandHandler {
    pub fn new(service: ChatService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut ChatService {
        &mut self.service
    }

    /// Handle one command from `recipient`.
    ///
    /// Chat and download work is spawned; its handle is returned so hosts
    /// may wait on it, but nothing requires them to.
    pub async fn handle<S: AsRef<str>>(
        &mut self,
        recipient: Arc<dyn Recipient>,
        args: &[S],
    ) -> Option<JoinHandle<()>> {
        let command = Command::parse(args);
        info!(recipient = recipient.id(), command = ?command, "Command received");

        match command {
            Command::Usage => {
                recipient.send_message(USAGE);
                None
            }
            Command::SetModel(model) => {
                if self.service.change_model(&model) {
                    recipient.send_message(&format!("Model switched to {}.", model));
                } else {
                    let available = self.service.config().available_models().join(", ");
                    recipient.send_message(&format!(
                        "Unknown model {}. Available models: {}",
                        model, available
                    ));
                }
                None
            }
            Command::SetMode(mode) => {
                if self.service.change_mode(&mode).await {
                    recipient.send_message(&format!("Mode switched to {}.", mode));
                    if Mode::parse(&mode) == Some(Mode::BuiltIn) && !self.service.is_serving() {
                        recipient.send_message(
                            "Failed to start the built-in Ollama server; check the logs.",
                        );
                    }
                } else {
                    recipient.send_message(&format!(
                        "Invalid mode {}. Valid modes: built-in, standalone",
                        mode
                    ));
                }
                None
            }
            Command::Download(model) => {
                let downloader = self.service.downloader();
                Some(tokio::spawn(async move {
                    downloader.run(&*recipient, &model).await;
                }))
            }
            Command::Chat(text) => {
                recipient.send_message(GENERATING);
                let backend = self.service.backend();
                let delay = self.service.line_delay();

                Some(tokio::spawn(async move {
                    let reply = backend.send(&text).await;
                    if let Err(e) = typing::deliver(recipient, &reply, delay).await {
                        warn!(error = %e, "Reply delivery task failed");
                    }
                }))
            }
        }
    }

    /// Stop the local server; call when the host shuts down
    pub async fn shutdown(&mut self) {
        self.service.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let args: [&str; 0] = [];
        assert_eq!(Command::parse(&args), Command::Usage);
    }

    #[test]
    fn test_parse_setmodel() {
        assert_eq!(
            Command::parse(&["setmodel", "llama3"]),
            Command::SetModel("llama3".to_string())
        );
        assert_eq!(Command::parse(&["setmodel"]), Command::Usage);
    }

    #[test]
    fn test_parse_setmode() {
        assert_eq!(
            Command::parse(&["SetMode", "standalone"]),
            Command::SetMode("standalone".to_string())
        );
        assert_eq!(Command::parse(&["setmode"]), Command::Usage);
    }

    #[test]
    fn test_parse_download() {
        assert_eq!(
            Command::parse(&["download", "mistral:7b"]),
            Command::Download("mistral:7b".to_string())
        );
    }

    #[test]
    fn test_parse_chat_joins_words() {
        assert_eq!(
            Command::parse(&["what", "is", "redstone?"]),
            Command::Chat("what is redstone?".to_string())
        );
        assert_eq!(
            Command::parse(&["hello".to_string()]),
            Command::Chat("hello".to_string())
        );
    }
}
