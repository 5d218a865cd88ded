//! Per-recipient progress indicators

use crate::recipient::Recipient;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A visible progress widget owned by one recipient
pub trait ProgressIndicator: Send {
    /// Display `fraction` (0.0 to 1.0)
    fn set_progress(&self, fraction: f64);

    /// Remove the widget from view
    fn close(&self);
}

struct ActiveBar {
    generation: u64,
    indicator: Box<dyn ProgressIndicator>,
}

#[derive(Default)]
struct Bars {
    next_generation: u64,
    by_recipient: HashMap<String, ActiveBar>,
}

/// Shared map from recipient id to its active indicator
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    bars: Arc<Mutex<Bars>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a new indicator for `recipient`, closing any previous one.
    ///
    /// Returns false when the recipient cannot display progress.
    pub fn show(&self, recipient: &dyn Recipient, label: &str) -> bool {
        self.show_generation(recipient, label).is_some()
    }

    /// `show`, returning a guard bound to the new indicator
    pub fn show_guarded(&self, recipient: &dyn Recipient, label: &str) -> Option<ProgressGuard> {
        let generation = self.show_generation(recipient, label)?;
        Some(ProgressGuard {
            registry: self.clone(),
            id: recipient.id().to_string(),
            generation: Some(generation),
        })
    }

    fn show_generation(&self, recipient: &dyn Recipient, label: &str) -> Option<u64> {
        let indicator = recipient.progress_indicator(label)?;

        let (generation, previous) = {
            let mut bars = self.bars.lock();
            bars.next_generation += 1;
            let generation = bars.next_generation;
            let previous = bars.by_recipient.insert(
                recipient.id().to_string(),
                ActiveBar {
                    generation,
                    indicator,
                },
            );
            (generation, previous)
        };
        if let Some(previous) = previous {
            previous.indicator.close();
        }
        debug!(recipient = recipient.id(), label, "Progress shown");
        Some(generation)
    }

    /// Set the fraction shown to `id`; no-op without an indicator
    pub fn update(&self, id: &str, fraction: f64) {
        self.update_matching(id, None, fraction);
    }

    /// Close and forget the indicator for `id`; no-op without one
    pub fn hide(&self, id: &str) {
        self.hide_matching(id, None);
    }

    pub fn is_showing(&self, id: &str) -> bool {
        self.bars.lock().by_recipient.contains_key(id)
    }

    /// Tie the indicator currently shown to `id` to a guard.
    ///
    /// The guard only touches that indicator: once a newer one replaces it,
    /// updates are dropped and the drop leaves the newer one in place.
    pub fn guard(&self, id: &str) -> ProgressGuard {
        let generation = self
            .bars
            .lock()
            .by_recipient
            .get(id)
            .map(|bar| bar.generation);
        ProgressGuard {
            registry: self.clone(),
            id: id.to_string(),
            generation,
        }
    }

    fn update_matching(&self, id: &str, generation: Option<u64>, fraction: f64) {
        let bars = self.bars.lock();
        if let Some(bar) = bars.by_recipient.get(id) {
            if generation.map_or(true, |g| g == bar.generation) {
                bar.indicator.set_progress(clamp_fraction(fraction));
            }
        }
    }

    fn hide_matching(&self, id: &str, generation: Option<u64>) {
        let removed = {
            let mut bars = self.bars.lock();
            let current = bars
                .by_recipient
                .get(id)
                .is_some_and(|bar| generation.map_or(true, |g| g == bar.generation));
            if current {
                bars.by_recipient.remove(id)
            } else {
                None
            }
        };
        if let Some(bar) = removed {
            bar.indicator.close();
            debug!(recipient = id, "Progress hidden");
        }
    }
}

/// Removes a recipient's indicator on drop, whatever path the caller took
pub struct ProgressGuard {
    registry: ProgressRegistry,
    id: String,
    generation: Option<u64>,
}

impl ProgressGuard {
    pub fn update(&self, fraction: f64) {
        if let Some(generation) = self.generation {
            self.registry
                .update_matching(&self.id, Some(generation), fraction);
        }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        if let Some(generation) = self.generation {
            self.registry.hide_matching(&self.id, Some(generation));
        }
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}
