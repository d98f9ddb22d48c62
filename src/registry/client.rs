//! Docker Registry v2 pull client
//!
//! Only the read side of the API is needed: the `/v2/` probe used for
//! authentication, `GET /v2/{name}/manifests/{reference}` and
//! `GET /v2/{name}/blobs/{digest}`. Blobs are streamed to disk and verified
//! against their digest while they arrive.

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{Result, SinkerError};
use crate::image::digest::DigestVerifier;
use crate::image::manifest::{ACCEPTED_MANIFEST_TYPES, Descriptor, ParsedManifest};
use crate::image::reference::ImageReference;
use crate::logging::Logger;
use crate::registry::auth::{Auth, RegistryCredential, RequestAuth};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct RegistryClientBuilder {
    skip_tls: bool,
    insecure_registries: Vec<String>,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(output: Logger) -> Self {
        Self {
            skip_tls: false,
            insecure_registries: Vec::new(),
            output,
        }
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    /// Registries reached over plain HTTP.
    pub fn with_insecure_registries(mut self, registries: Vec<String>) -> Self {
        self.insecure_registries = registries;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if self.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        let client = builder
            .build()
            .map_err(|e| SinkerError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(RegistryClient {
            auth: Auth::new(client.clone(), self.output.clone()),
            client,
            insecure_registries: self.insecure_registries,
            output: self.output,
        })
    }
}

pub struct RegistryClient {
    client: Client,
    auth: Auth,
    insecure_registries: Vec<String>,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(output: Logger) -> RegistryClientBuilder {
        RegistryClientBuilder::new(output)
    }

    /// Base URL of the registry API for `reference`.
    pub fn base_url(&self, reference: &ImageReference) -> String {
        let scheme = if self.is_insecure(&reference.registry) {
            "http"
        } else {
            "https"
        };
        format!("{}://{}", scheme, reference.api_host())
    }

    fn is_insecure(&self, registry: &str) -> bool {
        self.insecure_registries.iter().any(|r| r == registry)
    }

    pub async fn authorize(
        &self,
        reference: &ImageReference,
        credential: Option<&RegistryCredential>,
    ) -> Result<RequestAuth> {
        self.auth
            .authorize(
                &self.base_url(reference),
                &reference.api_repository(),
                credential,
            )
            .await
    }

    /// Fetches the manifest or index stored under `tag_or_digest`.
    pub async fn pull_manifest(
        &self,
        reference: &ImageReference,
        tag_or_digest: &str,
        auth: &RequestAuth,
    ) -> Result<ParsedManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(reference),
            reference.api_repository(),
            tag_or_digest
        );
        self.output.detail(&format!("Fetching manifest: {}", url));

        let request = auth.apply(self.client.get(&url).header(ACCEPT, ACCEPTED_MANIFEST_TYPES));
        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest pull"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &text,
                &format!("manifest pull for {}", reference),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response
            .bytes()
            .await
            .map_err(|e| SinkerError::Network(format!("Failed to read manifest: {}", e)))?;

        ParsedManifest::parse(&data, content_type.as_deref())
    }

    /// Streams a blob into `dest`, verifying its digest. Returns the byte count.
    ///
    /// `dest` is removed again when the download or verification fails.
    pub async fn download_blob(
        &self,
        reference: &ImageReference,
        blob: &Descriptor,
        auth: &RequestAuth,
        dest: &Path,
    ) -> Result<u64> {
        let result = self.download_blob_inner(reference, blob, auth, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn download_blob_inner(
        &self,
        reference: &ImageReference,
        blob: &Descriptor,
        auth: &RequestAuth,
        dest: &Path,
    ) -> Result<u64> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.base_url(reference),
            reference.api_repository(),
            blob.digest
        );
        let mut verifier = DigestVerifier::new(&blob.digest)?;

        // Redirects to blob storage are followed by reqwest
        let response = auth
            .apply(self.client.get(&url))
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "blob pull"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_registry_error(
                status,
                &text,
                &format!("blob pull {}", blob.digest),
            ));
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "blob stream"))?;
            verifier.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        let bytes = verifier.finish()?;
        if blob.size != 0 && bytes != blob.size {
            return Err(SinkerError::Validation(format!(
                "Blob {} size mismatch. Expected: {}, Got: {}",
                blob.digest, blob.size, bytes
            )));
        }

        self.output.detail(&format!(
            "Downloaded {} ({})",
            blob.digest,
            self.output.format_size(bytes)
        ));
        Ok(bytes)
    }
}
