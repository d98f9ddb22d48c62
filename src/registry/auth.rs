//! Registry credentials and token authentication
//!
//! Credentials travel through the sync engine as an opaque encoded string: URL-safe
//! base64 of `{"username": ..., "password": ...}`, or the empty string for anonymous
//! access. [`CredentialResolver`] produces them from the environment variables a
//! manifest names, falling back to the Docker client config file. [`Auth`] turns a
//! credential into request authorization by answering the registry's challenge.

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{Result, SinkerError};
use crate::image::reference::DOCKER_HUB_REGISTRY;
use crate::logging::Logger;
use crate::manifest::AuthEnv;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

const DOCKER_HUB_CONFIG_KEY: &str = "https://index.docker.io/v1/";

/// Username and password for one registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegistryCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE.encode(json))
    }

    /// Decodes an encoded credential. The empty string means anonymous.
    pub fn decode(encoded: &str) -> Result<Option<Self>> {
        if encoded.is_empty() {
            return Ok(None);
        }
        let json = URL_SAFE.decode(encoded)?;
        let credential = serde_json::from_slice(&json)
            .map_err(|e| SinkerError::Auth(format!("Malformed encoded credential: {}", e)))?;
        Ok(Some(credential))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerConfigAuth>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Looks up credentials for a registry host.
///
/// An `auth` block from the manifest wins: both environment variables it names must
/// be set. Without one, the Docker config file is consulted, and a host with no
/// entry there is accessed anonymously.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    env: HashMap<String, String>,
    docker_config: Option<PathBuf>,
}

impl CredentialResolver {
    pub fn new(env: HashMap<String, String>, docker_config: Option<PathBuf>) -> Self {
        Self { env, docker_config }
    }

    /// Snapshot of the process environment plus the user's Docker config path.
    pub fn from_process() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        let docker_config = env
            .get("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .map(|dir| dir.join("config.json"));
        Self { env, docker_config }
    }

    pub fn resolve(&self, host: &str, auth: Option<&AuthEnv>) -> Result<Option<RegistryCredential>> {
        match auth {
            Some(auth) if !auth.is_empty() => {
                let username = self.env_var(&auth.username, host, "username")?;
                let password = self.env_var(&auth.password, host, "password")?;
                Ok(Some(RegistryCredential { username, password }))
            }
            _ => match &self.docker_config {
                Some(path) if path.exists() => Self::from_docker_config(path, host),
                _ => Ok(None),
            },
        }
    }

    /// Encoded credential for `host`, empty for anonymous access.
    pub fn encoded(&self, host: &str, auth: Option<&AuthEnv>) -> Result<String> {
        match self.resolve(host, auth)? {
            Some(credential) => credential.encode(),
            None => Ok(String::new()),
        }
    }

    fn env_var(&self, name: &str, host: &str, field: &str) -> Result<String> {
        if name.is_empty() {
            return Err(SinkerError::Auth(format!(
                "no environment variable named for the {} {}",
                host, field
            )));
        }
        self.env.get(name).cloned().ok_or_else(|| {
            SinkerError::Auth(format!(
                "environment variable {} ({} {}) is not set",
                name, host, field
            ))
        })
    }

    fn from_docker_config(path: &Path, host: &str) -> Result<Option<RegistryCredential>> {
        let contents = std::fs::read_to_string(path)?;
        let config: DockerConfig = serde_json::from_str(&contents).map_err(|e| {
            SinkerError::Auth(format!("Invalid Docker config {}: {}", path.display(), e))
        })?;

        let mut keys = vec![host.to_string(), format!("https://{}", host)];
        if host == DOCKER_HUB_REGISTRY {
            keys.push(DOCKER_HUB_CONFIG_KEY.to_string());
        }

        let Some(entry) = keys.iter().find_map(|key| config.auths.get(key)) else {
            return Ok(None);
        };

        if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
            let decoded = String::from_utf8(STANDARD.decode(auth)?)?;
            let (username, password) = decoded.split_once(':').ok_or_else(|| {
                SinkerError::Auth(format!("Malformed auth entry for {} in Docker config", host))
            })?;
            return Ok(Some(RegistryCredential::new(username, password)));
        }

        match (&entry.username, &entry.password) {
            (Some(username), Some(password)) => {
                Ok(Some(RegistryCredential::new(username, password)))
            }
            _ => Ok(None),
        }
    }
}

/// How requests to one repository are authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAuth {
    Anonymous,
    Basic { username: String, password: String },
    Bearer(String),
}

impl RequestAuth {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            RequestAuth::Anonymous => request,
            RequestAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            RequestAuth::Bearer(token) => request.bearer_auth(token),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthChallenge {
    Bearer {
        realm: String,
        service: Option<String>,
    },
    Basic,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Auth {
    client: Client,
    output: Logger,
}

impl Auth {
    pub fn new(client: Client, output: Logger) -> Self {
        Self { client, output }
    }

    /// Probes `{base_url}/v2/` and answers whatever challenge comes back with a
    /// pull-scoped authorization for `repository`.
    pub async fn authorize(
        &self,
        base_url: &str,
        repository: &str,
        credential: Option<&RegistryCredential>,
    ) -> Result<RequestAuth> {
        let url = format!("{}/v2/", base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "registry probe"))?;

        let status = response.status();
        self.output
            .detail(&format!("Registry probe {} returned {}", url, status));

        if status.is_success() {
            return Ok(RequestAuth::Anonymous);
        }
        if status != StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &text,
                "registry probe",
            ));
        }

        let header = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match parse_auth_challenge(&header) {
            Some(AuthChallenge::Bearer { realm, service }) => {
                let scope = format!("repository:{}:pull", repository);
                let token = self
                    .get_token(&realm, service.as_deref(), &scope, credential)
                    .await?;
                Ok(RequestAuth::Bearer(token))
            }
            Some(AuthChallenge::Basic) => match credential {
                Some(c) => Ok(RequestAuth::Basic {
                    username: c.username.clone(),
                    password: c.password.clone(),
                }),
                None => Err(SinkerError::Auth(format!(
                    "{} requires credentials",
                    base_url
                ))),
            },
            None => Err(SinkerError::Auth(format!(
                "Unsupported authentication challenge from {}: '{}'",
                base_url, header
            ))),
        }
    }

    async fn get_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credential: Option<&RegistryCredential>,
    ) -> Result<String> {
        let mut url = Url::parse(realm)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", scope);
        }

        self.output.detail(&format!("Requesting token from: {}", url));

        let mut request = self.client.get(url.as_str());
        if let Some(c) = credential {
            request = request.basic_auth(&c.username, Some(&c.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "token request"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_auth_error(status, &text));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SinkerError::Parse(format!("Failed to parse token response: {}", e)))?;

        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SinkerError::Auth("Token response carried no token".to_string()))
    }
}

/// Parses a `WWW-Authenticate` header such as
/// `Bearer realm="https://auth.docker.io/token",service="registry.docker.io"`.
pub(crate) fn parse_auth_challenge(header: &str) -> Option<AuthChallenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(AuthChallenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values = HashMap::new();
    for param in params.split(',') {
        if let Some((key, value)) = param.trim().split_once('=') {
            values.insert(key.trim().to_ascii_lowercase(), value.trim().trim_matches('"'));
        }
    }

    let realm = values.get("realm")?.to_string();
    Some(AuthChallenge::Bearer {
        realm,
        service: values.get("service").map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encoded_credential_decodes_back() {
        let credential = RegistryCredential::new("user", "p@ss:word");
        let encoded = credential.encode().unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(RegistryCredential::decode(&encoded).unwrap(), Some(credential));
        assert_eq!(RegistryCredential::decode("").unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(RegistryCredential::decode("not base64!").is_err());
        assert!(RegistryCredential::decode(&URL_SAFE.encode(b"[]")).is_err());
    }

    #[test]
    fn test_env_auth() {
        let resolver = CredentialResolver::new(env(&[("U", "alice"), ("P", "secret")]), None);
        let auth = AuthEnv::new("U", "P");
        let credential = resolver.resolve("quay.io", Some(&auth)).unwrap();
        assert_eq!(credential, Some(RegistryCredential::new("alice", "secret")));
    }

    #[test]
    fn test_missing_env_var_fails() {
        let resolver = CredentialResolver::new(env(&[("U", "alice")]), None);
        let err = resolver
            .resolve("quay.io", Some(&AuthEnv::new("U", "P")))
            .unwrap_err();
        assert!(err.to_string().contains("environment variable P"));
    }

    #[test]
    fn test_no_auth_is_anonymous() {
        let resolver = CredentialResolver::new(HashMap::new(), None);
        assert_eq!(resolver.encoded("docker.io", None).unwrap(), "");
    }

    #[test]
    fn test_docker_config_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let hub = STANDARD.encode("hubuser:hubpass");
        std::fs::write(
            &path,
            format!(
                r#"{{"auths": {{"https://index.docker.io/v1/": {{"auth": "{}"}},
                    "ghcr.io": {{"username": "gh", "password": "tok"}}}}}}"#,
                hub
            ),
        )
        .unwrap();

        let resolver = CredentialResolver::new(HashMap::new(), Some(path));
        assert_eq!(
            resolver.resolve("docker.io", None).unwrap(),
            Some(RegistryCredential::new("hubuser", "hubpass"))
        );
        assert_eq!(
            resolver.resolve("ghcr.io", None).unwrap(),
            Some(RegistryCredential::new("gh", "tok"))
        );
        assert_eq!(resolver.resolve("quay.io", None).unwrap(), None);
    }

    #[test]
    fn test_malformed_docker_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let resolver = CredentialResolver::new(HashMap::new(), Some(path));
        assert!(resolver.resolve("quay.io", None).is_err());
    }

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = parse_auth_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull""#,
        );
        assert_eq!(
            challenge,
            Some(AuthChallenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
            })
        );
        assert_eq!(
            parse_auth_challenge(r#"Basic realm="Registry""#),
            Some(AuthChallenge::Basic)
        );
        assert_eq!(parse_auth_challenge("Negotiate"), None);
        assert_eq!(parse_auth_challenge("Bearer service=\"x\""), None);
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let debug = format!("{:?}", RegistryCredential::new("u", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
