//! Typed notifications emitted while planning and fetching

use super::{Origin, SyncState};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StateChanged { from: SyncState, to: SyncState },
    PlanStarted { origin: Origin, entries: usize },
    ImagePresent { image: String },
    ImageMissing { image: String },
    /// A second manifest entry resolved to an image already in the work set.
    DuplicateImage { image: String },
    /// Same as `DuplicateImage`, but the entries carry different credentials.
    CredentialConflict { image: String },
    PullStarted { image: String, index: usize, total: usize },
    ImagePulled { image: String, elapsed: Duration },
    /// Emitted once per successful run, after the last pull.
    AllPulled { count: usize, elapsed: Duration },
}

/// Caller-supplied sink for [`SyncEvent`]s.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

impl<T: SyncObserver + ?Sized> SyncObserver for std::sync::Arc<T> {
    fn on_event(&self, event: &SyncEvent) {
        (**self).on_event(event)
    }
}
