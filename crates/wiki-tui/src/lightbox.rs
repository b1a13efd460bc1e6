//! Double activation detection for image blocks.

use std::time::{Duration, Instant};

/// Two activations of the same block closer than this open the lightbox.
pub const DOUBLE_ACTIVATION_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct ActivationTracker {
    last: Option<(String, Instant)>,
}

impl ActivationTracker {
    /// Record an activation of `block_id` at `now`. Returns true when it
    /// completes a double activation; the pair is then consumed.
    pub fn activate(&mut self, block_id: &str, now: Instant) -> bool {
        let is_double = self.last.as_ref().is_some_and(|(id, at)| {
            id == block_id && now.saturating_duration_since(*at) < DOUBLE_ACTIVATION_WINDOW
        });

        self.last = if is_double {
            None
        } else {
            Some((block_id.to_string(), now))
        };
        is_double
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
