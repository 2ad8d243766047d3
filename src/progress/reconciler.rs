//! Monotonic progress reconciliation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::records::ProgressEvent;

/// Clamp a reported progress value into `[0, 100]`.
///
/// Non-finite input (NaN, infinities) maps to 0 so it can never poison
/// the running maximum.
fn clamp_progress(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Stabilize one incoming progress event against the previously exposed
/// event for the same id.
///
/// While the transfer is active the exposed progress never decreases:
/// out-of-order or jittery reports are lifted to the running maximum. A
/// terminal event (completed, failed, cancelled) is exposed with its own
/// clamped value even if lower, so a failure at 0% after a burst of
/// progress reports correctly.
pub fn stabilize_progress_event(
    incoming: &ProgressEvent,
    previous: Option<&ProgressEvent>,
) -> ProgressEvent {
    let mut event = incoming.clone();
    event.progress = clamp_progress(incoming.progress);

    let Some(previous) = previous else {
        return event;
    };

    if event.status.is_active() {
        event.progress = event.progress.max(previous.progress);
    }

    event
}

/// Per-id reconciliation state shared by all engine streams.
///
/// Both engines may emit for the same id concurrently; the read-modify-
/// write of the previous event happens under one lock so no update is
/// lost.
pub struct ProgressReconciler {
    last: Mutex<HashMap<String, ProgressEvent>>,
}

impl ProgressReconciler {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile one incoming event and record it as the new previous
    /// state for its id.
    ///
    /// Terminal events drop the per-id state: the download is finished and
    /// a later re-download starts a fresh monotonic sequence.
    pub fn reconcile(&self, incoming: &ProgressEvent) -> ProgressEvent {
        let mut last = self.last.lock().unwrap();
        let stabilized = stabilize_progress_event(incoming, last.get(&incoming.id));

        if stabilized.status.is_terminal() {
            last.remove(&incoming.id);
        } else {
            last.insert(incoming.id.clone(), stabilized.clone());
        }

        stabilized
    }

    /// Drop the state for an id, e.g. when the download is deleted.
    pub fn forget(&self, id: &str) {
        self.last.lock().unwrap().remove(id);
    }

    /// Drop all per-id state, e.g. when all downloads are cleared.
    pub fn clear(&self) {
        self.last.lock().unwrap().clear();
    }

    /// Number of ids currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.last.lock().unwrap().len()
    }
}

impl Default for ProgressReconciler {
    fn default() -> Self {
        Self::new()
    }
}
