//! Command-line argument parsing

use crate::sync::Origin;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sinker")]
#[command(about = "Keep container images listed in a manifest available locally")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the image manifest
    #[arg(
        long = "manifest",
        short = 'm',
        global = true,
        help = "Path to the image manifest (default: .images.yaml)"
    )]
    pub manifest: Option<String>,

    /// Local image cache directory
    #[arg(
        long = "cache-dir",
        global = true,
        help = "Directory holding pulled images (default: .cache)"
    )]
    pub cache_dir: Option<String>,

    /// Deadline for the whole run, in seconds
    #[arg(
        long = "timeout",
        short = 't',
        global = true,
        help = "Timeout for the whole run in seconds (default: 1800)"
    )]
    pub timeout: Option<u64>,

    /// Skip TLS verification
    #[arg(
        long = "skip-tls",
        short = 'k',
        global = true,
        help = "Skip TLS certificate verification"
    )]
    pub skip_tls: bool,

    /// Registries to reach over plain HTTP
    #[arg(
        long = "insecure-registry",
        global = true,
        help = "Registry host to contact over plain HTTP (repeatable)"
    )]
    pub insecure_registries: Vec<String>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet output
    #[arg(
        long = "quiet",
        short = 'q',
        global = true,
        conflicts_with = "verbose",
        help = "Only print errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pull every manifest image that is missing locally
    Pull {
        /// Which side of each manifest entry to pull
        #[arg(value_parser = ["source", "target"])]
        origin: Option<String>,

        /// Restrict the run to these images
        #[arg(long = "images", short = 'i', help = "Image to pull (repeatable)")]
        images: Vec<String>,
    },
}

impl Command {
    pub fn origin(&self) -> Origin {
        match self {
            Command::Pull { origin, .. } => Origin::from_arg(origin.as_deref()),
        }
    }

    pub fn images(&self) -> &[String] {
        match self {
            Command::Pull { images, .. } => images,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_defaults_to_source() {
        let args = Args::try_parse_from(["sinker", "pull"]).unwrap();
        assert_eq!(args.command.origin(), Origin::Source);
        assert!(args.command.images().is_empty());
    }

    #[test]
    fn test_pull_target_with_images() {
        let args = Args::try_parse_from([
            "sinker",
            "pull",
            "target",
            "-i",
            "busybox",
            "--images",
            "quay.io/app:v1",
            "--manifest",
            "mirror.yaml",
        ])
        .unwrap();
        assert_eq!(args.command.origin(), Origin::Target);
        assert_eq!(args.command.images(), ["busybox", "quay.io/app:v1"]);
        assert_eq!(args.manifest.as_deref(), Some("mirror.yaml"));
    }

    #[test]
    fn test_rejects_unknown_origin() {
        assert!(Args::try_parse_from(["sinker", "pull", "mirror"]).is_err());
    }
}
