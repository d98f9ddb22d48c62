use crate::error::{Result, SinkerError};
use crate::image::digest::DigestUtils;
use crate::image::reference::ImageReference;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CACHE_DIR: &str = ".cache";
pub const MANIFESTS_DIR: &str = "manifests";
pub const BLOBS_DIR: &str = "blobs";
pub const SHA256_PREFIX: &str = "sha256";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub digest: String,
    pub size: u64,
    pub is_config: bool,
    pub media_type: String,
}

/// Local image store
///
/// Pulled images are kept in a layout mirroring the registry API:
/// ```text
/// .cache/
///   manifests/{registry}/{repository}/{reference}
///   blobs/sha256/{digest}
///   index.json
/// ```
/// An image counts as present only once it has an index entry, its manifest file
/// and every blob it references. Entries are written after all blobs are on disk,
/// so an interrupted pull never looks complete.
pub struct Cache {
    cache_dir: PathBuf,
    index: HashMap<String, CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct CacheEntry {
    image: String,
    manifest_path: PathBuf,
    config_digest: String,
    blobs: Vec<BlobInfo>,
    pulled_at: u64,
}

impl Cache {
    /// Opens the cache at `cache_dir` (default `.cache`), creating it if needed.
    pub fn new<P: AsRef<Path>>(cache_dir: Option<P>) -> Result<Self> {
        let cache_dir = match cache_dir {
            Some(dir) => PathBuf::from(dir.as_ref()),
            None => PathBuf::from(CACHE_DIR),
        };

        fs::create_dir_all(cache_dir.join(MANIFESTS_DIR)).map_err(|e| SinkerError::Cache {
            message: format!("Failed to create cache directory: {}", e),
            path: Some(cache_dir.clone()),
        })?;
        fs::create_dir_all(cache_dir.join(BLOBS_DIR).join(SHA256_PREFIX))?;

        let index_path = cache_dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let contents = fs::read_to_string(&index_path)?;
            serde_json::from_str(&contents).map_err(|e| SinkerError::Cache {
                message: format!("Failed to parse cache index: {}", e),
                path: Some(index_path.clone()),
            })?
        } else {
            HashMap::new()
        };

        Ok(Cache { cache_dir, index })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// True when the image and all of its blobs are stored.
    pub fn has_image(&self, reference: &ImageReference) -> bool {
        match self.index.get(&reference.to_string()) {
            Some(entry) => {
                entry.manifest_path.exists()
                    && entry.blobs.iter().all(|blob| self.has_blob(&blob.digest))
            }
            None => false,
        }
    }

    /// Blob path for a `sha256:<64 hex>` digest. Anything else is rejected, so a
    /// digest can never name a path outside the blob directory.
    pub fn get_blob_path(&self, digest: &str) -> Result<PathBuf> {
        let hex = DigestUtils::extract_hex_part(digest)?;
        Ok(self
            .cache_dir
            .join(BLOBS_DIR)
            .join(SHA256_PREFIX)
            .join(hex))
    }

    /// Scratch path a blob is downloaded to before it is moved into place.
    pub fn partial_blob_path(&self, digest: &str) -> Result<PathBuf> {
        let mut path = self.get_blob_path(digest)?.into_os_string();
        path.push(".partial");
        Ok(PathBuf::from(path))
    }

    /// Check if a blob exists in cache. Malformed digests are never present.
    pub fn has_blob(&self, digest: &str) -> bool {
        self.get_blob_path(digest)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Moves a verified download into the blob store.
    pub fn commit_blob(&self, digest: &str, downloaded: &Path) -> Result<PathBuf> {
        let blob_path = self.get_blob_path(digest)?;
        fs::rename(downloaded, &blob_path).map_err(|e| SinkerError::Cache {
            message: format!("Failed to store blob {}: {}", digest, e),
            path: Some(blob_path.clone()),
        })?;
        Ok(blob_path)
    }

    /// Records a fully pulled image. Every blob must already be in the store.
    pub fn store_image(
        &mut self,
        reference: &ImageReference,
        manifest: &[u8],
        config_digest: &str,
        blobs: Vec<BlobInfo>,
    ) -> Result<PathBuf> {
        if let Some(missing) = blobs.iter().find(|b| !self.has_blob(&b.digest)) {
            return Err(SinkerError::Cache {
                message: format!("Blob {} not found in cache", missing.digest),
                path: self.get_blob_path(&missing.digest).ok(),
            });
        }

        let manifest_dir = self
            .cache_dir
            .join(MANIFESTS_DIR)
            .join(&reference.registry)
            .join(&reference.repository);
        fs::create_dir_all(&manifest_dir)?;

        let manifest_path = manifest_dir.join(reference.reference().replace(':', "_"));
        fs::write(&manifest_path, manifest)?;

        let pulled_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let image = reference.to_string();
        self.index.insert(
            image.clone(),
            CacheEntry {
                image,
                manifest_path: manifest_path.clone(),
                config_digest: config_digest.to_string(),
                blobs,
                pulled_at,
            },
        );
        self.save_index()?;

        Ok(manifest_path)
    }

    /// Writes the index to a temporary file and renames it over the old one.
    fn save_index(&self) -> Result<()> {
        let index_path = self.cache_dir.join(INDEX_FILE);
        let tmp_path = self.cache_dir.join(format!("{}.tmp", INDEX_FILE));
        let json_data = serde_json::to_string_pretty(&self.index)
            .map_err(|e| SinkerError::Parse(format!("Failed to serialize cache index: {}", e)))?;

        fs::write(&tmp_path, json_data)?;
        fs::rename(&tmp_path, &index_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_blob(cache: &Cache, data: &[u8]) -> BlobInfo {
        let digest = DigestUtils::compute_docker_digest(data);
        let partial = cache.partial_blob_path(&digest).unwrap();
        fs::write(&partial, data).unwrap();
        cache.commit_blob(&digest, &partial).unwrap();
        BlobInfo {
            digest,
            size: data.len() as u64,
            is_config: false,
            media_type: String::new(),
        }
    }

    #[test]
    fn test_store_and_find_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(Some(dir.path())).unwrap();
        let reference = ImageReference::parse("quay.io/app:v1").unwrap();
        assert!(!cache.has_image(&reference));

        let config = put_blob(&cache, b"{}");
        let layer = put_blob(&cache, b"layer");
        cache
            .store_image(&reference, b"manifest", &config.digest.clone(), vec![config, layer])
            .unwrap();

        assert!(cache.has_image(&reference));
        assert!(fs::read(dir.path().join(MANIFESTS_DIR).join("quay.io/app/v1")).is_ok());
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let reference = ImageReference::parse(
            "quay.io/app@sha256:4f47c01fa91355af2865ac10fef5bf6ec9c7f42ad2321377c21e844427972977",
        )
        .unwrap();
        {
            let mut cache = Cache::new(Some(dir.path())).unwrap();
            let config = put_blob(&cache, b"cfg");
            cache
                .store_image(&reference, b"m", &config.digest.clone(), vec![config])
                .unwrap();
        }
        let cache = Cache::new(Some(dir.path())).unwrap();
        assert!(cache.has_image(&reference));
    }

    #[test]
    fn test_missing_blob_means_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(Some(dir.path())).unwrap();
        let reference = ImageReference::parse("quay.io/app:v1").unwrap();
        let layer = put_blob(&cache, b"layer");
        let layer_path = cache.get_blob_path(&layer.digest).unwrap();
        cache
            .store_image(&reference, b"m", "sha256:none", vec![layer])
            .unwrap();

        fs::remove_file(layer_path).unwrap();
        assert!(!cache.has_image(&reference));
    }

    #[test]
    fn test_store_requires_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(Some(dir.path())).unwrap();
        let reference = ImageReference::parse("quay.io/app:v1").unwrap();
        let blob = BlobInfo {
            digest: DigestUtils::compute_docker_digest(b"never written"),
            size: 13,
            is_config: false,
            media_type: String::new(),
        };
        let err = cache.store_image(&reference, b"m", "", vec![blob]).unwrap_err();
        assert!(matches!(err, SinkerError::Cache { .. }));
    }

    #[test]
    fn test_malformed_digests_never_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = Cache::new(Some(dir.path())).unwrap();
        let reference = ImageReference::parse("quay.io/app:v1").unwrap();
        let blob = put_blob(&cache, b"cfg");
        cache
            .store_image(&reference, b"m", &blob.digest.clone(), vec![blob])
            .unwrap();
        assert!(dir.path().join("index.json").exists());

        for digest in ["sha256:..", "sha256:../../index.json", "sha256:", "md5:abc"] {
            assert!(!cache.has_blob(digest), "{}", digest);
            assert!(cache.get_blob_path(digest).is_err());
            assert!(cache.partial_blob_path(digest).is_err());
        }

        let bogus = BlobInfo {
            digest: "sha256:../../index.json".to_string(),
            size: 0,
            is_config: false,
            media_type: String::new(),
        };
        assert!(cache.store_image(&reference, b"m", "", vec![bogus]).is_err());
    }
}
