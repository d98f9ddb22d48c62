//! Image reference parsing
//!
//! Parses names like `quay.io/coreos/etcd:v3.5.0` into registry, repository, tag and
//! digest. Names without a registry component belong to Docker Hub.

use crate::error::{Result, SinkerError};
use std::fmt;

pub const DOCKER_HUB_REGISTRY: &str = "docker.io";
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SinkerError::Validation("Empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(SinkerError::Validation(format!(
                        "Invalid digest in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon only separates a tag when it follows the last slash;
        // otherwise it belongs to a registry port.
        let last_slash = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first.to_string(), rest.to_string()),
            _ => (DOCKER_HUB_REGISTRY.to_string(), name.to_string()),
        };

        if repository.is_empty() || tag.as_deref() == Some("") {
            return Err(SinkerError::Validation(format!(
                "Invalid image reference '{}'",
                reference
            )));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(Self {
            registry: normalize_registry(&registry),
            repository,
            tag,
            digest,
        })
    }

    /// Digest when present, otherwise the tag.
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Repository path as the registry API expects it; official Docker Hub
    /// images live under `library/`.
    pub fn api_repository(&self) -> String {
        if self.registry == DOCKER_HUB_REGISTRY && !self.repository.contains('/') {
            format!("library/{}", self.repository)
        } else {
            self.repository.clone()
        }
    }

    /// Host the registry API is served from.
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB_REGISTRY {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn normalize_registry(registry: &str) -> String {
    match registry {
        "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
            DOCKER_HUB_REGISTRY.to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert_eq!(r.api_repository(), "library/nginx");
        assert_eq!(r.api_host(), "registry-1.docker.io");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("localhost:5000/team/app:1.2").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "team/app");
        assert_eq!(r.tag.as_deref(), Some("1.2"));
        assert_eq!(r.to_string(), "localhost:5000/team/app:1.2");
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse("quay.io/coreos/etcd@sha256:abcd").unwrap();
        assert_eq!(r.tag, None);
        assert_eq!(r.digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(r.reference(), "sha256:abcd");
        assert_eq!(r.to_string(), "quay.io/coreos/etcd@sha256:abcd");
    }

    #[test]
    fn test_user_repository_on_docker_hub() {
        let r = ImageReference::parse("jimmidyson/configmap-reload:v0.3.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.api_repository(), "jimmidyson/configmap-reload");
    }

    #[test]
    fn test_equivalent_names_normalize_equal() {
        let a = ImageReference::parse("busybox").unwrap();
        let b = ImageReference::parse("index.docker.io/busybox:latest").unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("quay.io/app@nodigest").is_err());
        assert!(ImageReference::parse("quay.io/app:").is_err());
    }
}
