//! Builds the work set: which images are missing and how to authenticate for them

use super::{ImageDescriptor, ImageStore, Insertion, Origin, SyncContext, SyncEvent, SyncObserver, WorkSet};
use crate::error::{Result, SinkerError};

pub struct SyncPlanner<'a, S: ?Sized> {
    store: &'a S,
    observer: &'a dyn SyncObserver,
}

impl<'a, S: ImageStore + ?Sized> SyncPlanner<'a, S> {
    pub fn new(store: &'a S, observer: &'a dyn SyncObserver) -> Self {
        Self { store, observer }
    }

    /// Walks `entries` in order, resolving each under `origin`.
    ///
    /// A credential or existence-check failure aborts the whole plan. Images
    /// already present are reported and skipped. An empty work set is a valid
    /// result.
    pub async fn plan<D: ImageDescriptor>(
        &self,
        entries: &[D],
        origin: Origin,
        ctx: &SyncContext,
    ) -> Result<WorkSet> {
        self.observer.on_event(&SyncEvent::PlanStarted {
            origin,
            entries: entries.len(),
        });

        let mut work_set = WorkSet::new();

        for entry in entries {
            let image = entry.resolve_name(origin);

            let credential = entry
                .resolve_credential(origin)
                .map_err(|e| auth_resolution_error(&image, origin, e))?;

            let exists = ctx
                .run(self.store.exists_locally(ctx, &image))
                .await
                .map_err(|e| registry_query_error(&image, e))?;

            if exists {
                self.observer.on_event(&SyncEvent::ImagePresent { image });
                continue;
            }

            match work_set.insert(image.clone(), credential) {
                Insertion::Added => self.observer.on_event(&SyncEvent::ImageMissing { image }),
                Insertion::Duplicate => {
                    self.observer.on_event(&SyncEvent::DuplicateImage { image })
                }
                Insertion::Conflict => {
                    self.observer.on_event(&SyncEvent::CredentialConflict { image })
                }
            }
        }

        Ok(work_set)
    }
}

fn auth_resolution_error(image: &str, origin: Origin, err: SinkerError) -> SinkerError {
    match err {
        SinkerError::AuthResolution { .. } => err,
        other => SinkerError::AuthResolution {
            image: image.to_string(),
            message: format!("get {} auth: {}", origin, other),
        },
    }
}

fn registry_query_error(image: &str, err: SinkerError) -> SinkerError {
    if err.is_interrupted() {
        return err;
    }
    match err {
        SinkerError::RegistryQuery { .. } => err,
        other => SinkerError::RegistryQuery {
            image: image.to_string(),
            message: other.to_string(),
        },
    }
}
