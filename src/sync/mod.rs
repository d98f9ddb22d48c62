//! Synchronization decision engine
//!
//! Given the manifest entries and an [`Origin`], the [`SyncPlanner`] works out which
//! images are missing locally and which credential each one needs, collapsing
//! entries that resolve to the same image into one [`WorkSet`] item. The
//! [`FetchExecutor`] then pulls the work set in order and stops at the first failure.
//! [`Synchronizer`] runs both phases and tracks the run's [`SyncState`].
//!
//! Every registry call goes through an [`ImageStore`] and is bounded by a single
//! [`SyncContext`] for the whole run. Progress is reported as [`SyncEvent`]s to a
//! caller-supplied [`SyncObserver`].

pub mod context;
pub mod events;
pub mod executor;
pub mod planner;
pub mod work_set;

pub use context::SyncContext;
pub use events::{RecordingObserver, SyncEvent, SyncObserver};
pub use executor::FetchExecutor;
pub use planner::SyncPlanner;
pub use work_set::{Insertion, WorkItem, WorkSet};

use crate::error::{Result, SinkerError};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which side of a manifest entry an operation works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Origin {
    #[default]
    Source,
    Target,
}

impl Origin {
    /// Lenient form used for optional user input: anything other than
    /// `target` selects the source side.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("target") => Origin::Target,
            _ => Origin::Source,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Source => "source",
            Origin::Target => "target",
        }
    }
}

impl FromStr for Origin {
    type Err = SinkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Origin::Source),
            "target" => Ok(Origin::Target),
            other => Err(SinkerError::Validation(format!(
                "Invalid origin '{}': expected 'source' or 'target'",
                other
            ))),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry that knows its image name and credential for either origin.
pub trait ImageDescriptor {
    fn resolve_name(&self, origin: Origin) -> String;
    fn resolve_credential(&self, origin: Origin) -> Result<String>;
}

/// Local image runtime the engine checks and fills.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn exists_locally(&self, ctx: &SyncContext, image: &str) -> Result<bool>;

    /// Pulls `image` with `credential` and returns once it is fully stored.
    async fn pull_and_wait(&self, ctx: &SyncContext, image: &str, credential: &str) -> Result<()>;
}

#[async_trait]
impl<T: ImageStore + ?Sized> ImageStore for Arc<T> {
    async fn exists_locally(&self, ctx: &SyncContext, image: &str) -> Result<bool> {
        (**self).exists_locally(ctx, image).await
    }

    async fn pull_and_wait(&self, ctx: &SyncContext, image: &str, credential: &str) -> Result<()> {
        (**self).pull_and_wait(ctx, image, credential).await
    }
}

/// Per-invocation state machine.
///
/// `Idle → Planning → (Planned | PlanFailed) → Fetching → (Done | FetchFailed)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Planning,
    Planned,
    PlanFailed,
    Fetching,
    Done,
    FetchFailed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::PlanFailed | SyncState::Done | SyncState::FetchFailed
        )
    }

    fn can_advance_to(&self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Idle, SyncState::Planning)
                | (SyncState::Planning, SyncState::Planned)
                | (SyncState::Planning, SyncState::PlanFailed)
                | (SyncState::Planned, SyncState::Fetching)
                | (SyncState::Fetching, SyncState::Done)
                | (SyncState::Fetching, SyncState::FetchFailed)
        )
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub origin: Origin,
    pub pulled: Vec<String>,
    pub state: SyncState,
}

/// Plans and fetches one manifest against one image store.
pub struct Synchronizer<S> {
    store: S,
    observer: Arc<dyn SyncObserver>,
}

impl<S: ImageStore> Synchronizer<S> {
    pub fn new(store: S, observer: Arc<dyn SyncObserver>) -> Self {
        Self { store, observer }
    }

    /// Runs a full plan-then-fetch cycle. Nothing is retried; a failed run is
    /// re-invoked as a whole and skips whatever earlier runs already stored.
    pub async fn run<D: ImageDescriptor>(
        &self,
        entries: &[D],
        origin: Origin,
        ctx: &SyncContext,
    ) -> Result<SyncReport> {
        let mut state = SyncState::Idle;
        self.advance(&mut state, SyncState::Planning);

        let planner = SyncPlanner::new(&self.store, self.observer.as_ref());
        let work_set = match planner.plan(entries, origin, ctx).await {
            Ok(work_set) => {
                self.advance(&mut state, SyncState::Planned);
                work_set
            }
            Err(e) => {
                self.advance(&mut state, SyncState::PlanFailed);
                return Err(e);
            }
        };

        let pulled: Vec<String> = work_set.images().map(str::to_string).collect();
        self.advance(&mut state, SyncState::Fetching);

        let executor = FetchExecutor::new(&self.store, self.observer.as_ref());
        match executor.execute(work_set, ctx).await {
            Ok(()) => self.advance(&mut state, SyncState::Done),
            Err(e) => {
                self.advance(&mut state, SyncState::FetchFailed);
                return Err(e);
            }
        }

        Ok(SyncReport {
            origin,
            pulled,
            state,
        })
    }

    fn advance(&self, state: &mut SyncState, next: SyncState) {
        debug_assert!(state.can_advance_to(next), "{:?} -> {:?}", state, next);
        self.observer.on_event(&SyncEvent::StateChanged {
            from: *state,
            to: next,
        });
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_arg_defaults_to_source() {
        assert_eq!(Origin::from_arg(None), Origin::Source);
        assert_eq!(Origin::from_arg(Some("bogus")), Origin::Source);
        assert_eq!(Origin::from_arg(Some("source")), Origin::Source);
        assert_eq!(Origin::from_arg(Some("Target")), Origin::Target);
    }

    #[test]
    fn test_origin_from_str_is_strict() {
        assert_eq!("target".parse::<Origin>().unwrap(), Origin::Target);
        assert!(matches!(
            "mirror".parse::<Origin>(),
            Err(SinkerError::Validation(_))
        ));
    }

    #[test]
    fn test_state_transitions() {
        assert!(SyncState::Idle.can_advance_to(SyncState::Planning));
        assert!(SyncState::Planned.can_advance_to(SyncState::Fetching));
        assert!(!SyncState::Idle.can_advance_to(SyncState::Fetching));
        assert!(!SyncState::Done.can_advance_to(SyncState::Planning));
        assert!(SyncState::FetchFailed.is_terminal());
        assert!(!SyncState::Planned.is_terminal());
    }
}
