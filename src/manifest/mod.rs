//! Image manifest: the declarative list of images to mirror
//!
//! The manifest is a YAML file (default `.images.yaml`) naming one mirror target and
//! any number of sources:
//!
//! ```yaml
//! target:
//!   host: mycompany.com
//!   repository: mirror
//!   auth:
//!     username: MIRROR_USER
//!     password: MIRROR_PASS
//! sources:
//!   - repository: coreos/prometheus-operator
//!     host: quay.io
//!     tag: v0.40.0
//!   - repository: busybox
//!     digest: sha256:4f47c01fa91355af2865ac10fef5bf6ec9c7f42ad2321377c21e844427972977
//! ```
//!
//! `auth` blocks name the environment variables holding a username and password.
//! Each source's mirror location is derived from the top-level `target` unless the
//! source carries its own `target` block. A missing host, for sources and targets
//! alike, means Docker Hub.

use crate::error::{Result, SinkerError};
use crate::image::reference::{DEFAULT_TAG, DOCKER_HUB_REGISTRY, ImageReference};
use crate::registry::auth::CredentialResolver;
use crate::sync::{ImageDescriptor, Origin};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MANIFEST_PATH: &str = ".images.yaml";

/// Names of the environment variables that hold a registry username and password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthEnv {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl AuthEnv {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// Manifest-wide mirror location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthEnv>,
}

/// Where one source is mirrored to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetImage {
    pub host: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub auth: Option<AuthEnv>,
}

impl TargetImage {
    pub fn image(&self) -> String {
        image_name(&self.host, &self.repository, &self.tag, &self.digest)
    }

    /// Encoded credential for the target registry.
    pub fn encoded_auth_with(&self, resolver: &CredentialResolver) -> Result<String> {
        resolver.encoded(registry_host(&self.host), self.auth.as_ref())
    }
}

/// One image to mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub host: String,
    pub repository: String,
    pub tag: String,
    pub digest: String,
    pub auth: Option<AuthEnv>,
    pub target: TargetImage,
}

impl Source {
    /// Source mirrored under `target` with the manifest's default naming.
    pub fn new(host: &str, repository: &str, tag: &str, target: &Target) -> Self {
        let mut source = Self {
            host: host.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        source.target = source.default_target(target);
        source
    }

    pub fn with_auth(mut self, auth: AuthEnv) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn image(&self) -> String {
        image_name(&self.host, &self.repository, &self.tag, &self.digest)
    }

    /// Encoded credential for the source registry.
    pub fn encoded_auth_with(&self, resolver: &CredentialResolver) -> Result<String> {
        resolver.encoded(registry_host(&self.host), self.auth.as_ref())
    }

    /// Credential for the registry `origin` points at.
    pub fn credential_for(&self, origin: Origin, resolver: &CredentialResolver) -> Result<String> {
        let result = match origin {
            Origin::Source => self.encoded_auth_with(resolver),
            Origin::Target => self.target.encoded_auth_with(resolver),
        };
        result.map_err(|e| SinkerError::AuthResolution {
            image: self.name(origin),
            message: format!("get {} auth: {}", origin, e),
        })
    }

    /// Image name under `origin`.
    pub fn name(&self, origin: Origin) -> String {
        match origin {
            Origin::Source => self.image(),
            Origin::Target => self.target.image(),
        }
    }

    fn default_target(&self, target: &Target) -> TargetImage {
        let repository = if target.repository.is_empty() {
            self.repository.clone()
        } else {
            format!(
                "{}/{}",
                target.repository.trim_end_matches('/'),
                self.repository
            )
        };

        TargetImage {
            host: target.host.clone(),
            repository,
            tag: self.tag.clone(),
            digest: self.digest.clone(),
            auth: target.auth.clone(),
        }
    }
}

/// A source paired with the resolver its credentials come from.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSource<'a> {
    pub source: &'a Source,
    resolver: &'a CredentialResolver,
}

impl ImageDescriptor for ResolvedSource<'_> {
    fn resolve_name(&self, origin: Origin) -> String {
        self.source.name(origin)
    }

    fn resolve_credential(&self, origin: Origin) -> Result<String> {
        self.source.credential_for(origin, self.resolver)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    target: Target,
    #[serde(default)]
    sources: Vec<RawSource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    #[serde(default)]
    repository: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    auth: Option<AuthEnv>,
    #[serde(default)]
    target: Option<RawTargetOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTargetOverride {
    host: Option<String>,
    repository: Option<String>,
    tag: Option<String>,
    auth: Option<AuthEnv>,
}

/// Ordered, immutable list of sources loaded from a manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageManifest {
    pub target: Target,
    sources: Vec<Source>,
}

impl ImageManifest {
    pub fn new(target: Target, sources: Vec<Source>) -> Self {
        Self { target, sources }
    }

    /// Reads and validates the manifest at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SinkerError::Config(format!("read manifest {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents).map_err(|e| match e {
            SinkerError::Config(msg) => {
                SinkerError::Config(format!("manifest {}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(contents)?;
        let target = raw.target;

        let sources = raw
            .sources
            .into_iter()
            .enumerate()
            .map(|(i, raw_source)| build_source(i, raw_source, &target))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { target, sources })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Every source, resolving credentials through one shared `resolver`.
    pub fn resolved<'a>(&'a self, resolver: &'a CredentialResolver) -> Vec<ResolvedSource<'a>> {
        self.sources
            .iter()
            .map(|source| ResolvedSource { source, resolver })
            .collect()
    }

    /// Keeps only the sources whose image under `origin` is listed in `images`.
    /// Names are compared in normalized form, so `busybox` matches
    /// `docker.io/busybox:latest`. An empty list keeps everything; a listed
    /// image missing from the manifest is an error.
    pub fn select(&self, images: &[String], origin: Origin) -> Result<Self> {
        if images.is_empty() {
            return Ok(self.clone());
        }

        let wanted = images
            .iter()
            .map(|image| ImageReference::parse(image).map(|r| r.to_string()))
            .collect::<Result<Vec<_>>>()?;

        let sources: Vec<Source> = self
            .sources
            .iter()
            .filter(|source| wanted.contains(&normalized_name(&source.name(origin))))
            .cloned()
            .collect();

        let found: Vec<String> = sources
            .iter()
            .map(|s| normalized_name(&s.name(origin)))
            .collect();
        if let Some((listed, _)) = images
            .iter()
            .zip(&wanted)
            .find(|(_, normalized)| !found.contains(normalized))
        {
            return Err(SinkerError::Validation(format!(
                "Image {} is not in the manifest",
                listed
            )));
        }

        Ok(Self {
            target: self.target.clone(),
            sources,
        })
    }
}

fn build_source(index: usize, raw: RawSource, target: &Target) -> Result<Source> {
    if raw.repository.trim().is_empty() {
        return Err(SinkerError::Config(format!(
            "source #{} has no repository",
            index + 1
        )));
    }

    let mut source = Source {
        host: raw.host,
        repository: raw.repository,
        tag: raw.tag,
        digest: raw.digest,
        auth: raw.auth,
        target: TargetImage::default(),
    };
    source.target = source.default_target(target);

    if let Some(over) = raw.target {
        if let Some(host) = over.host {
            source.target.host = host;
        }
        if let Some(repository) = over.repository {
            source.target.repository = repository;
        }
        if let Some(tag) = over.tag {
            source.target.tag = tag;
            source.target.digest.clear();
        }
        if over.auth.is_some() {
            source.target.auth = over.auth;
        }
    }

    Ok(source)
}

fn registry_host(host: &str) -> &str {
    if host.is_empty() { DOCKER_HUB_REGISTRY } else { host }
}

/// `host/repository@digest` when a digest is set, otherwise `host/repository:tag`.
fn image_name(host: &str, repository: &str, tag: &str, digest: &str) -> String {
    let host = registry_host(host);
    if !digest.is_empty() {
        format!("{}/{}@{}", host, repository, digest)
    } else if !tag.is_empty() {
        format!("{}/{}:{}", host, repository, tag)
    } else {
        format!("{}/{}:{}", host, repository, DEFAULT_TAG)
    }
}

fn normalized_name(image: &str) -> String {
    ImageReference::parse(image)
        .map(|r| r.to_string())
        .unwrap_or_else(|_| image.to_string())
}
