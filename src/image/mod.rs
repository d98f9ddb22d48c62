//! Image naming, manifests and the local image cache
//!
//! [`ImageReference`] turns image names into the registry, repository and tag or
//! digest the registry API needs. [`ParsedManifest`] reads Docker v2 and OCI
//! manifests and indexes. [`Cache`] is the on-disk store that answers "is this image
//! already here" and receives pulled blobs.

pub mod cache;
pub mod digest;
pub mod manifest;
pub mod reference;

pub use cache::{BlobInfo, Cache};
pub use digest::{DigestUtils, DigestVerifier};
pub use manifest::{Descriptor, ManifestType, ParsedManifest, Platform};
pub use reference::ImageReference;
