//! Pulls images from registries into the local cache

use crate::error::{Result, SinkerError};
use crate::image::cache::{BlobInfo, Cache};
use crate::image::manifest::ParsedManifest;
use crate::image::reference::ImageReference;
use crate::logging::Logger;
use crate::registry::auth::{RegistryCredential, RequestAuth};
use crate::registry::client::RegistryClient;
use crate::sync::{ImageStore, SyncContext};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_OS: &str = "linux";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// [`ImageStore`] that treats the local [`Cache`] as "local" and fills it from the
/// registry named in each image reference. Multi-platform images resolve to
/// linux/amd64.
pub struct CachingPuller {
    client: RegistryClient,
    cache: Mutex<Cache>,
    output: Logger,
}

impl CachingPuller {
    pub fn new(client: RegistryClient, cache: Cache, output: Logger) -> Self {
        Self {
            client,
            cache: Mutex::new(cache),
            output,
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, Cache>> {
        self.cache.lock().map_err(|_| SinkerError::Cache {
            message: "cache lock poisoned".to_string(),
            path: None,
        })
    }

    /// Resolves an index to this puller's platform; image manifests pass through.
    async fn resolve_platform(
        &self,
        reference: &ImageReference,
        manifest: ParsedManifest,
        auth: &RequestAuth,
    ) -> Result<ParsedManifest> {
        if !manifest.manifest_type.is_index() {
            return Ok(manifest);
        }

        let entry = manifest
            .select_platform(DEFAULT_OS, DEFAULT_ARCHITECTURE)
            .ok_or_else(|| {
                SinkerError::NotFound(format!("{} has an empty manifest index", reference))
            })?;
        self.output.detail(&format!(
            "Selected {} from index for {}/{}",
            entry.digest, DEFAULT_OS, DEFAULT_ARCHITECTURE
        ));

        let resolved = self
            .client
            .pull_manifest(reference, &entry.digest, auth)
            .await?;
        resolved.verify_digest(&entry.digest)?;
        if resolved.manifest_type.is_index() {
            return Err(SinkerError::Parse(format!(
                "Nested manifest index in {}",
                reference
            )));
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ImageStore for CachingPuller {
    async fn exists_locally(&self, _ctx: &SyncContext, image: &str) -> Result<bool> {
        let reference = ImageReference::parse(image)?;
        Ok(self.cache()?.has_image(&reference))
    }

    async fn pull_and_wait(&self, ctx: &SyncContext, image: &str, credential: &str) -> Result<()> {
        let reference = ImageReference::parse(image)?;
        let credential = RegistryCredential::decode(credential)?;

        let auth = self.client.authorize(&reference, credential.as_ref()).await?;
        let manifest = self
            .client
            .pull_manifest(&reference, reference.reference(), &auth)
            .await?;
        if let Some(digest) = &reference.digest {
            manifest.verify_digest(digest)?;
        }
        let manifest = self.resolve_platform(&reference, manifest, &auth).await?;

        let mut blobs = Vec::new();
        for descriptor in manifest.blobs() {
            ctx.check()?;

            let is_config = manifest
                .config
                .as_ref()
                .is_some_and(|c| c.digest == descriptor.digest);
            let (present, partial) = {
                let cache = self.cache()?;
                (
                    cache.has_blob(&descriptor.digest),
                    cache.partial_blob_path(&descriptor.digest)?,
                )
            };

            let size = if present {
                self.output
                    .detail(&format!("Blob {} already cached", descriptor.digest));
                descriptor.size
            } else {
                let size = self
                    .client
                    .download_blob(&reference, descriptor, &auth, &partial)
                    .await?;
                self.cache()?.commit_blob(&descriptor.digest, &partial)?;
                size
            };

            blobs.push(BlobInfo {
                digest: descriptor.digest.clone(),
                size,
                is_config,
                media_type: descriptor.media_type.clone(),
            });
        }

        let config_digest = manifest
            .config
            .as_ref()
            .map(|c| c.digest.clone())
            .unwrap_or_default();
        self.cache()?
            .store_image(&reference, &manifest.raw_data, &config_digest, blobs)?;

        self.output.verbose(&format!("Stored {} in cache", reference));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::digest::DigestUtils;
    use std::time::Duration;

    fn puller(dir: &std::path::Path) -> CachingPuller {
        let output = Logger::new_quiet();
        let client = RegistryClient::builder(output.clone()).build().unwrap();
        CachingPuller::new(client, Cache::new(Some(dir)).unwrap(), output)
    }

    #[tokio::test]
    async fn test_exists_locally_follows_cache() {
        let dir = tempfile::tempdir().unwrap();
        let puller = puller(dir.path());
        let ctx = SyncContext::with_timeout(Duration::from_secs(5));

        assert!(!puller.exists_locally(&ctx, "quay.io/app:v1").await.unwrap());

        {
            let mut cache = puller.cache().unwrap();
            let digest = DigestUtils::compute_docker_digest(b"{}");
            let partial = cache.partial_blob_path(&digest).unwrap();
            std::fs::write(&partial, b"{}").unwrap();
            cache.commit_blob(&digest, &partial).unwrap();
            let reference = ImageReference::parse("quay.io/app:v1").unwrap();
            let blob = BlobInfo {
                digest: digest.clone(),
                size: 2,
                is_config: true,
                media_type: String::new(),
            };
            cache
                .store_image(&reference, b"{}", &digest, vec![blob])
                .unwrap();
        }

        assert!(puller.exists_locally(&ctx, "quay.io/app:v1").await.unwrap());
        assert!(puller.exists_locally(&ctx, "quay.io/app:v2").await.is_ok_and(|e| !e));
    }

    #[tokio::test]
    async fn test_malformed_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SyncContext::with_timeout(Duration::from_secs(5));
        assert!(puller(dir.path()).exists_locally(&ctx, "").await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_credential_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SyncContext::with_timeout(Duration::from_secs(5));
        let err = puller(dir.path())
            .pull_and_wait(&ctx, "quay.io/app:v1", "%%%")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkerError::Auth(_)));
    }
}
