//! Line-by-line "typing" delivery of replies

use crate::recipient::Recipient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Length of one tick, the unit of `line-delay`
pub const TICK: Duration = Duration::from_millis(50);

pub fn ticks_to_duration(ticks: u64) -> Duration {
    TICK.saturating_mul(ticks.min(u32::MAX as u64) as u32)
}

/// A reply line and when it is due, relative to the start of delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledLine {
    pub offset: Duration,
    pub text: String,
}

/// Split `reply` on newlines; line `k` is due at `k * delay`.
///
/// Trailing line breaks produce no empty lines; an empty reply is one empty line.
pub fn schedule(reply: &str, delay: Duration) -> Vec<ScheduledLine> {
    reply
        .trim_end_matches(['\r', '\n'])
        .split('\n')
        .enumerate()
        .map(|(idx, line)| ScheduledLine {
            offset: delay.saturating_mul(idx.min(u32::MAX as usize) as u32),
            text: line.strip_suffix('\r').unwrap_or(line).to_string(),
        })
        .collect()
}

/// Deliver `reply` to `recipient` one line at a time.
///
/// Lines are sent in order from a single task, each at its absolute deadline,
/// so a slow recipient does not push later lines further back.
pub fn deliver(recipient: Arc<dyn Recipient>, reply: &str, delay: Duration) -> JoinHandle<()> {
    let lines = schedule(reply, delay);

    tokio::spawn(async move {
        let start = Instant::now();
        for line in lines {
            sleep_until(start + line.offset).await;
            recipient.send_message(&line.text);
        }
    })
}
