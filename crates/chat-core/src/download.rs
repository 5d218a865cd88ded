//! Model download flow with per-recipient progress

use crate::process::{ModelPuller, PullOutcome};
use crate::progress::ProgressRegistry;
use crate::recipient::Recipient;
use tracing::error;

pub const NON_INTERACTIVE_REPLY: &str = "Only interactive users can download models.";
pub const MISSING_EXECUTABLE_REPLY: &str = "Ollama executable not found!";

/// Runs `pull` for a recipient; cloneable into a spawned task
#[derive(Clone)]
pub struct Downloader {
    puller: ModelPuller,
    progress: ProgressRegistry,
}

impl Downloader {
    pub fn new(puller: ModelPuller, progress: ProgressRegistry) -> Self {
        Self { puller, progress }
    }

    /// Download `model`, reporting progress to `recipient`.
    ///
    /// The progress entry exists only while this call runs.
    pub async fn run(&self, recipient: &dyn Recipient, model: &str) {
        let label = format!("Downloading model: {}", model);
        let Some(progress) = self.progress.show_guarded(recipient, &label) else {
            recipient.send_message(NON_INTERACTIVE_REPLY);
            return;
        };

        if !self.puller.executable_exists() {
            error!("Ollama executable not found");
            recipient.send_message(MISSING_EXECUTABLE_REPLY);
            return;
        }

        match self.puller.pull(model, |fraction| progress.update(fraction)).await {
            Ok(PullOutcome::Succeeded) => {
                recipient.send_message(&format!("Model {} downloaded.", model));
                recipient.send_message(&format!("Use setmodel {} to enable it.", model));
            }
            Ok(PullOutcome::Failed(_)) => {
                recipient.send_message(&format!("Failed to download model {}.", model));
            }
            Err(e) => {
                error!("Error while downloading model {}: {:#}", model, e);
                recipient.send_message(&format!("Error while downloading model: {:#}", e));
            }
        }
    }
}
