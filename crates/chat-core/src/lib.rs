//! chat-core: relay chat commands to a local or hosted LLM
//!
//! Provides:
//! - Configuration store (config.toml)
//! - Ollama client (streaming NDJSON) and New API client
//! - Built-in Ollama server supervision and model downloads
//! - Per-recipient progress indicators and line-by-line reply delivery
//! - Command dispatch

pub mod command;
pub mod config;
pub mod download;
pub mod new_api;
pub mod ollama;
pub mod process;
pub mod progress;
pub mod recipient;
pub mod service;
pub mod typing;

pub use command::{Command, CommandHandler};
pub use config::{ApiType, AuthScheme, ConfigStore, Mode};
pub use download::Downloader;
pub use new_api::NewApiClient;
pub use ollama::{Completion, Fragment, FragmentStream, OllamaClient};
pub use process::{ModelPuller, ProcessSupervisor, PullOutcome};
pub use progress::{ProgressGuard, ProgressIndicator, ProgressRegistry};
pub use recipient::Recipient;
pub use service::{Backend, ChatService};
