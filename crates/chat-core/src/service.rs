//! Chat service: backend selection, model/mode switching and reply display

use crate::config::{ApiType, ConfigStore, Mode};
use crate::download::Downloader;
use crate::new_api::NewApiClient;
use crate::ollama::OllamaClient;
use crate::process::{default_executable, ProcessSupervisor};
use crate::progress::ProgressRegistry;
use crate::recipient::Recipient;
use crate::typing;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A snapshot of the active backend, cheap to clone into a task
#[derive(Debug, Clone)]
pub enum Backend {
    Ollama(OllamaClient),
    NewApi(NewApiClient),
    Unsupported(String),
}

impl Backend {
    /// Ask the backend; errors come back as reply text
    pub async fn send(&self, prompt: &str) -> String {
        match self {
            Backend::Ollama(client) => client.send(prompt).await,
            Backend::NewApi(client) => client.send(prompt).await,
            Backend::Unsupported(kind) => {
                warn!(api_type = %kind, "Unsupported API type");
                format!("Unsupported API type: {}", kind)
            }
        }
    }
}

pub struct ChatService {
    config: ConfigStore,
    ollama: OllamaClient,
    new_api: NewApiClient,
    supervisor: ProcessSupervisor,
    progress: ProgressRegistry,
}

impl ChatService {
    /// Build the service; in built-in mode the local server is started
    pub fn new(config: ConfigStore) -> Self {
        let mut service = Self::without_server(config);
        if service.config.mode() == Mode::BuiltIn {
            service.start_server();
        }
        service
    }

    /// Build the service without touching any process
    pub fn without_server(config: ConfigStore) -> Self {
        let timeout = config.request_timeout();
        let mode = config.mode();

        let ollama =
            OllamaClient::with_timeout(config.url_for(mode), config.ollama_model(), timeout);
        let new_api = NewApiClient::new(
            config.new_api_url(),
            config.new_api_key(),
            config.new_api_model(),
        )
        .with_auth(config.new_api_auth())
        .with_response_field(config.new_api_response_field())
        .with_timeout(timeout);

        let executable = config
            .executable_override()
            .unwrap_or_else(|| default_executable(&config.data_dir()));
        let supervisor = ProcessSupervisor::new(executable, config.data_dir())
            .with_models_dir(config.models_dir());

        info!(mode = %mode, api_type = ?config.api_type(), "Chat service ready");

        Self {
            config,
            ollama,
            new_api,
            supervisor,
            progress: ProgressRegistry::new(),
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn ollama(&self) -> &OllamaClient {
        &self.ollama
    }

    pub fn new_api(&self) -> &NewApiClient {
        &self.new_api
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub fn is_serving(&mut self) -> bool {
        self.supervisor.is_running()
    }

    pub fn server_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    fn start_server(&mut self) -> bool {
        match self.supervisor.start() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to start Ollama service: {:#}", e);
                false
            }
        }
    }

    /// The backend selected by `api-type`
    pub fn backend(&self) -> Backend {
        match self.config.api_type() {
            ApiType::Ollama => Backend::Ollama(self.ollama.clone()),
            ApiType::NewApi => Backend::NewApi(self.new_api.clone()),
            ApiType::Unsupported(kind) => Backend::Unsupported(kind),
        }
    }

    pub fn line_delay(&self) -> Duration {
        typing::ticks_to_duration(self.config.line_delay_ticks())
    }

    /// Send one message to the active backend
    pub async fn send_request(&self, text: &str) -> String {
        self.backend().send(text).await
    }

    /// Switch the active model.
    ///
    /// For Ollama the name must be listed in `ollama.available_models`; the
    /// New API accepts any non-empty name.
    pub fn change_model(&mut self, name: &str) -> bool {
        match self.config.api_type() {
            ApiType::NewApi => {
                if name.is_empty() {
                    return false;
                }
                if let Err(e) = self.config.set_new_api_model(name) {
                    error!("Failed to persist model: {:#}", e);
                }
                self.new_api.set_model(name);
            }
            _ => {
                if !self.config.available_models().iter().any(|m| m == name) {
                    return false;
                }
                if let Err(e) = self.config.set_ollama_model(name) {
                    error!("Failed to persist model: {:#}", e);
                }
                self.ollama.set_model(name);
            }
        }

        info!(model = name, "Model changed");
        true
    }

    /// Switch between `built-in` and `standalone`.
    ///
    /// Any running server is stopped first; switching to built-in starts a new
    /// one. The live client is re-pointed to the mode's URL.
    pub async fn change_mode(&mut self, name: &str) -> bool {
        let Some(mode) = Mode::parse(name) else {
            return false;
        };

        if let Err(e) = self.config.set_mode(mode) {
            error!("Failed to persist mode: {:#}", e);
        }

        if let Err(e) = self.supervisor.stop().await {
            error!("Failed to stop Ollama service: {:#}", e);
        }
        if mode == Mode::BuiltIn {
            self.start_server();
        }

        self.ollama.set_url(self.config.url_for(mode));
        info!(mode = %mode, url = %self.ollama.url(), "Mode changed");
        true
    }

    /// Deliver `reply` line by line with the configured delay
    pub fn show_typing_effect(&self, recipient: Arc<dyn Recipient>, reply: &str) -> JoinHandle<()> {
        typing::deliver(recipient, reply, self.line_delay())
    }

    /// A detached handle for running downloads off the command context
    pub fn downloader(&self) -> Downloader {
        Downloader::new(self.supervisor.puller(), self.progress.clone())
    }

    /// Pull `model` for `recipient`, reporting progress and the result
    pub async fn download_model(&self, recipient: &dyn Recipient, model: &str) {
        self.downloader().run(recipient, model).await;
    }

    /// Poll the Ollama endpoint until it answers or `timeout` passes
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            if self.ollama.health_check().await {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Stop the local server, if any
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.supervisor.stop().await {
            error!("Failed to stop Ollama service: {:#}", e);
        }
    }
}
