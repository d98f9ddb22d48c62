//! Pulls every planned image, stopping at the first failure

use super::{ImageStore, SyncContext, SyncEvent, SyncObserver, WorkSet};
use crate::error::{Result, SinkerError};
use std::time::Instant;

pub struct FetchExecutor<'a, S: ?Sized> {
    store: &'a S,
    observer: &'a dyn SyncObserver,
}

impl<'a, S: ImageStore + ?Sized> FetchExecutor<'a, S> {
    pub fn new(store: &'a S, observer: &'a dyn SyncObserver) -> Self {
        Self { store, observer }
    }

    /// Pulls the work set sequentially under `ctx`.
    ///
    /// The first failed pull ends the run and is returned wrapped with its
    /// image name; images pulled before it stay in place. Completion is
    /// reported once, only when every pull succeeded.
    pub async fn execute(&self, work_set: WorkSet, ctx: &SyncContext) -> Result<()> {
        let started = Instant::now();
        let total = work_set.len();

        for (i, item) in work_set.into_iter().enumerate() {
            self.observer.on_event(&SyncEvent::PullStarted {
                image: item.image.clone(),
                index: i + 1,
                total,
            });

            let pull_started = Instant::now();
            ctx.run(self.store.pull_and_wait(ctx, &item.image, &item.credential))
                .await
                .map_err(|e| SinkerError::fetch(&item.image, e))?;

            self.observer.on_event(&SyncEvent::ImagePulled {
                image: item.image,
                elapsed: pull_started.elapsed(),
            });
        }

        self.observer.on_event(&SyncEvent::AllPulled {
            count: total,
            elapsed: started.elapsed(),
        });
        Ok(())
    }
}
