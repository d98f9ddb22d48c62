//! Runtime configuration: command-line flags over environment over defaults

use crate::cli::args::Args;
use crate::error::{Result, SinkerError};
use crate::image::cache::CACHE_DIR;
use crate::manifest::DEFAULT_MANIFEST_PATH;
use std::time::Duration;

/// 30 minutes for a whole run
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// One week
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub manifest_path: String,
    pub cache_dir: String,
    pub timeout: u64,
    pub skip_tls: bool,
    pub insecure_registries: Vec<String>,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            cache_dir: CACHE_DIR.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            skip_tls: false,
            insecure_registries: Vec::new(),
            verbose: false,
            quiet: false,
        }
    }
}

impl AppConfig {
    /// Create config from environment variables and defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("SINKER_MANIFEST") {
            config.manifest_path = val;
        }
        if let Some(val) = lookup("SINKER_CACHE_DIR") {
            config.cache_dir = val;
        }
        if let Some(timeout) = lookup("SINKER_TIMEOUT").and_then(|v| v.parse().ok()) {
            config.timeout = timeout;
        }
        if let Some(val) = lookup("SINKER_VERBOSE") {
            config.verbose = is_truthy(&val);
        }
        if let Some(val) = lookup("SINKER_SKIP_TLS") {
            config.skip_tls = is_truthy(&val);
        }
        if let Some(val) = lookup("SINKER_INSECURE_REGISTRIES") {
            config.insecure_registries = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// Flags given on the command line win over the environment.
    pub fn with_args(mut self, args: &Args) -> Self {
        if let Some(manifest) = &args.manifest {
            self.manifest_path = manifest.clone();
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache_dir = cache_dir.clone();
        }
        if let Some(timeout) = args.timeout {
            self.timeout = timeout;
        }
        if !args.insecure_registries.is_empty() {
            self.insecure_registries = args.insecure_registries.clone();
        }
        self.skip_tls |= args.skip_tls;
        self.verbose |= args.verbose;
        self.quiet = args.quiet;
        if self.quiet {
            self.verbose = false;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            return Err(SinkerError::Validation(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.timeout > MAX_TIMEOUT_SECS {
            return Err(SinkerError::Validation(format!(
                "timeout must be at most {} seconds, got {}",
                MAX_TIMEOUT_SECS, self.timeout
            )));
        }
        if self.manifest_path.trim().is_empty() {
            return Err(SinkerError::Validation(
                "manifest path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn is_truthy(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(1800));
        assert_eq!(config.manifest_path, ".images.yaml");
    }

    #[test]
    fn test_environment_fallbacks() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SINKER_MANIFEST", "mirror.yaml"),
            ("SINKER_TIMEOUT", "60"),
            ("SINKER_VERBOSE", "true"),
            ("SINKER_SKIP_TLS", "0"),
            ("SINKER_INSECURE_REGISTRIES", "localhost:5000, registry.lan"),
        ]));
        assert_eq!(config.manifest_path, "mirror.yaml");
        assert_eq!(config.timeout, 60);
        assert!(config.verbose);
        assert!(!config.skip_tls);
        assert_eq!(config.insecure_registries, ["localhost:5000", "registry.lan"]);
    }

    #[test]
    fn test_flags_override_environment() {
        let args =
            Args::try_parse_from(["sinker", "pull", "--manifest", "cli.yaml", "-t", "5", "-q"])
                .unwrap();
        let config = AppConfig::from_lookup(lookup(&[
            ("SINKER_MANIFEST", "env.yaml"),
            ("SINKER_VERBOSE", "1"),
        ]))
        .with_args(&args);
        assert_eq!(config.manifest_path, "cli.yaml");
        assert_eq!(config.timeout, 5);
        assert!(config.quiet);
        assert!(!config.verbose);
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let config = AppConfig {
            timeout: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_timeout_is_invalid() {
        let args =
            Args::try_parse_from(["sinker", "pull", "--timeout", "18446744073709551615"]).unwrap();
        let config = AppConfig::default().with_args(&args);
        assert!(matches!(config.validate(), Err(SinkerError::Validation(_))));

        let week = AppConfig {
            timeout: MAX_TIMEOUT_SECS,
            ..Default::default()
        };
        assert!(week.validate().is_ok());
    }
}
