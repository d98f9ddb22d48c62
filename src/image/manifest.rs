//! Docker v2 and OCI manifest parsing

use crate::error::{Result, SinkerError};
use crate::image::digest::DigestUtils;
use serde::Deserialize;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Value for the `Accept` header when fetching manifests.
pub const ACCEPTED_MANIFEST_TYPES: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    DockerV2,
    DockerList,
    OciManifest,
    OciIndex,
}

impl ManifestType {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        // Content-Type headers may carry parameters
        let media_type = media_type.split(';').next().unwrap_or("").trim();
        match media_type {
            DOCKER_MANIFEST_V2 => Some(ManifestType::DockerV2),
            DOCKER_MANIFEST_LIST => Some(ManifestType::DockerList),
            OCI_MANIFEST => Some(ManifestType::OciManifest),
            OCI_INDEX => Some(ManifestType::OciIndex),
            _ => None,
        }
    }

    pub fn to_content_type(self) -> &'static str {
        match self {
            ManifestType::DockerV2 => DOCKER_MANIFEST_V2,
            ManifestType::DockerList => DOCKER_MANIFEST_LIST,
            ManifestType::OciManifest => OCI_MANIFEST,
            ManifestType::OciIndex => OCI_INDEX,
        }
    }

    pub fn is_index(self) -> bool {
        matches!(self, ManifestType::DockerList | ManifestType::OciIndex)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Descriptor {
    #[serde(rename = "mediaType", default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "schemaVersion", default)]
    schema_version: u32,
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

/// A manifest or index as fetched from a registry.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    pub manifest_type: ManifestType,
    pub config: Option<Descriptor>,
    pub layers: Vec<Descriptor>,
    pub manifests: Vec<Descriptor>,
    pub raw_data: Vec<u8>,
}

impl ParsedManifest {
    /// Parses `data`, using the response content type when the document
    /// itself does not name one.
    pub fn parse(data: &[u8], content_type: Option<&str>) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(data)
            .map_err(|e| SinkerError::Parse(format!("Invalid manifest: {}", e)))?;

        if raw.schema_version != 2 {
            return Err(SinkerError::Parse(format!(
                "Unsupported manifest schema version: {}",
                raw.schema_version
            )));
        }

        let manifest_type = raw
            .media_type
            .as_deref()
            .and_then(ManifestType::from_media_type)
            .or_else(|| content_type.and_then(ManifestType::from_media_type))
            .or_else(|| {
                // Untyped OCI documents are told apart by their shape
                if !raw.manifests.is_empty() {
                    Some(ManifestType::OciIndex)
                } else if raw.config.is_some() {
                    Some(ManifestType::OciManifest)
                } else {
                    None
                }
            })
            .ok_or_else(|| SinkerError::Parse("Unknown manifest media type".to_string()))?;

        if !manifest_type.is_index() && raw.config.is_none() {
            return Err(SinkerError::Parse(
                "Missing config descriptor in image manifest".to_string(),
            ));
        }

        for descriptor in raw.config.iter().chain(&raw.layers).chain(&raw.manifests) {
            DigestUtils::extract_hex_part(&descriptor.digest).map_err(|e| {
                SinkerError::Parse(format!("Invalid descriptor in manifest: {}", e))
            })?;
        }

        Ok(Self {
            manifest_type,
            config: raw.config,
            layers: raw.layers,
            manifests: raw.manifests,
            raw_data: data.to_vec(),
        })
    }

    /// Picks the entry for `os`/`architecture` from an index, falling back to
    /// the first entry.
    pub fn select_platform(&self, os: &str, architecture: &str) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|m| {
                m.platform
                    .as_ref()
                    .is_some_and(|p| p.os == os && p.architecture == architecture)
            })
            .or_else(|| self.manifests.first())
    }

    /// Checks the raw document against the digest it was requested by.
    pub fn verify_digest(&self, expected: &str) -> Result<()> {
        let actual = DigestUtils::compute_docker_digest(&self.raw_data);
        if actual != expected {
            return Err(SinkerError::Validation(format!(
                "Manifest digest mismatch. Expected: {}, Got: {}",
                expected, actual
            )));
        }
        Ok(())
    }

    /// Config and layer descriptors, config first.
    pub fn blobs(&self) -> impl Iterator<Item = &Descriptor> {
        self.config.iter().chain(self.layers.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "size": 10, "digest": "sha256:c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0"},
        "layers": [
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 100, "digest": "sha256:1111111111111111111111111111111111111111111111111111111111111111"},
            {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 200, "digest": "sha256:1212121212121212121212121212121212121212121212121212121212121212"}
        ]
    }"#;

    const INDEX: &str = r#"{
        "schemaVersion": 2,
        "manifests": [
            {"mediaType": "application/vnd.oci.image.manifest.v1+json", "size": 1, "digest": "sha256:a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1", "platform": {"architecture": "arm64", "os": "linux"}},
            {"mediaType": "application/vnd.oci.image.manifest.v1+json", "size": 1, "digest": "sha256:a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2a2", "platform": {"architecture": "amd64", "os": "linux"}}
        ]
    }"#;

    #[test]
    fn test_parse_docker_v2() {
        let parsed = ParsedManifest::parse(IMAGE.as_bytes(), None).unwrap();
        assert_eq!(parsed.manifest_type, ManifestType::DockerV2);
        let digests: Vec<_> = parsed.blobs().map(|d| d.digest.as_str()).collect();
        assert_eq!(digests.len(), 3);
        assert!(digests[0].starts_with("sha256:c0c0"));
        assert!(digests[1].starts_with("sha256:1111"));
        assert!(digests[2].starts_with("sha256:1212"));
    }

    #[test]
    fn test_untyped_index_selects_platform() {
        let parsed = ParsedManifest::parse(INDEX.as_bytes(), None).unwrap();
        assert_eq!(parsed.manifest_type, ManifestType::OciIndex);
        let amd64 = parsed.select_platform("linux", "amd64").unwrap();
        assert!(amd64.digest.starts_with("sha256:a2a2"));
        // No s390x entry, so the first one is used
        let fallback = parsed.select_platform("linux", "s390x").unwrap();
        assert!(fallback.digest.starts_with("sha256:a1a1"));
    }

    #[test]
    fn test_media_type_with_parameters() {
        assert_eq!(
            ManifestType::from_media_type("application/vnd.oci.image.index.v1+json; charset=utf-8"),
            Some(ManifestType::OciIndex)
        );
    }

    #[test]
    fn test_rejects_non_hex_descriptor_digest() {
        let doc = IMAGE.replace(&"11".repeat(32), "../../index.json");
        let err = ParsedManifest::parse(doc.as_bytes(), None).unwrap_err();
        assert!(matches!(err, SinkerError::Parse(_)));
    }

    #[test]
    fn test_verify_digest() {
        let parsed = ParsedManifest::parse(IMAGE.as_bytes(), None).unwrap();
        let digest = DigestUtils::compute_docker_digest(IMAGE.as_bytes());
        assert!(parsed.verify_digest(&digest).is_ok());
        assert!(matches!(
            parsed.verify_digest(&DigestUtils::compute_docker_digest(b"other")),
            Err(SinkerError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_schema_v1() {
        let err = ParsedManifest::parse(br#"{"schemaVersion": 1}"#, None).unwrap_err();
        assert!(matches!(err, SinkerError::Parse(_)));
    }
}
