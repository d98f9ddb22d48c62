//! Image Sinker Library
//!
//! Keeps the container images listed in a manifest available locally: a sync run
//! checks every manifest image against the local store and pulls whatever is
//! missing, from either the images' original registries or their mirror.

pub mod cli;
pub mod error;
pub mod image;
pub mod logging;
pub mod manifest;
pub mod registry;
pub mod sync;

pub use error::{Result, SinkerError};
pub use logging::Logger;
pub use manifest::{ImageManifest, ResolvedSource, Source};
pub use sync::{Origin, SyncContext, SyncReport, Synchronizer};
