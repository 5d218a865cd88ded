//! The actor that issues commands and receives replies

use crate::progress::ProgressIndicator;

/// Host-side handle for whoever issued a command.
///
/// Implementations deliver plain text to the actor. Interactive actors also
/// provide a progress indicator; the default of `None` marks the recipient as
/// non-interactive (consoles piped to a file, automation, ...).
pub trait Recipient: Send + Sync {
    /// Stable key used to associate per-recipient state
    fn id(&self) -> &str;

    fn send_message(&self, text: &str);

    /// Create a fresh progress indicator titled `label`
    fn progress_indicator(&self, _label: &str) -> Option<Box<dyn ProgressIndicator>> {
        None
    }
}
