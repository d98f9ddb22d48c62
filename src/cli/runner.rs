//! Wires configuration, manifest, registry and sync engine together for one run

use crate::cli::args::{Args, Command};
use crate::cli::config::AppConfig;
use crate::error::Result;
use crate::image::cache::Cache;
use crate::logging::Logger;
use crate::manifest::ImageManifest;
use crate::registry::{CachingPuller, CredentialResolver, RegistryClient};
use crate::sync::{SyncContext, SyncReport, Synchronizer};
use std::sync::Arc;

pub struct Runner {
    config: AppConfig,
    command: Command,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        let config = AppConfig::from_env().with_args(&args);
        config.validate()?;
        Ok(Self::with_config(config, args.command))
    }

    pub fn with_config(config: AppConfig, command: Command) -> Self {
        let output = if config.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(config.verbose)
        };
        Self {
            config,
            command,
            output,
        }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    pub async fn run(&self) -> Result<SyncReport> {
        match &self.command {
            Command::Pull { .. } => self.pull().await,
        }
    }

    async fn pull(&self) -> Result<SyncReport> {
        let origin = self.command.origin();
        self.output.section("Image Sync");

        let manifest = ImageManifest::load(&self.config.manifest_path)?
            .select(self.command.images(), origin)?;
        self.output.verbose(&format!(
            "Loaded {} image(s) from {}",
            manifest.len(),
            self.config.manifest_path
        ));

        let cache = Cache::new(Some(&self.config.cache_dir))?;
        let client = RegistryClient::builder(self.output.clone())
            .with_skip_tls(self.config.skip_tls)
            .with_insecure_registries(self.config.insecure_registries.clone())
            .build()?;
        let puller = CachingPuller::new(client, cache, self.output.clone());
        let synchronizer = Synchronizer::new(puller, Arc::new(self.output.clone()));

        let ctx = SyncContext::with_timeout(self.config.timeout());
        let token = ctx.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let resolver = CredentialResolver::from_process();
        let result = synchronizer
            .run(&manifest.resolved(&resolver), origin, &ctx)
            .await;
        interrupt.abort();
        let report = result?;

        self.output.summary_kv(
            "Summary",
            &[
                ("Origin", report.origin.to_string()),
                ("Images", manifest.len().to_string()),
                ("Pulled", report.pulled.len().to_string()),
                (
                    "Elapsed",
                    self.output.format_duration(self.output.elapsed()),
                ),
            ],
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkerError;
    use crate::sync::SyncState;

    fn runner(manifest: &std::path::Path, cache: &std::path::Path, images: Vec<String>) -> Runner {
        let config = AppConfig {
            manifest_path: manifest.display().to_string(),
            cache_dir: cache.display().to_string(),
            quiet: true,
            ..Default::default()
        };
        Runner::with_config(
            config,
            Command::Pull {
                origin: None,
                images,
            },
        )
    }

    #[tokio::test]
    async fn test_missing_manifest_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(&dir.path().join("absent.yaml"), dir.path(), vec![]);
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, SinkerError::Config(_)));
    }

    #[tokio::test]
    async fn test_empty_manifest_completes() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join(".images.yaml");
        std::fs::write(&manifest, "target:\n  host: mirror.local\nsources: []\n").unwrap();

        let report = runner(&manifest, &dir.path().join("cache"), vec![])
            .run()
            .await
            .unwrap();
        assert_eq!(report.state, SyncState::Done);
        assert!(report.pulled.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_image_filter_fails_before_planning() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join(".images.yaml");
        std::fs::write(
            &manifest,
            "target:\n  host: mirror.local\nsources:\n  - repository: busybox\n",
        )
        .unwrap();

        let err = runner(&manifest, &dir.path().join("cache"), vec!["nginx".to_string()])
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SinkerError::Validation(_)));
    }
}
