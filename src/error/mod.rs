//! Error types for manifest loading, credential resolution and registry operations

pub mod handlers;

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SinkerError>;

#[derive(Debug, Error)]
pub enum SinkerError {
    /// Manifest could not be loaded or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Credential for a single manifest entry could not be produced
    #[error("Auth resolution failed for {image}: {message}")]
    AuthResolution { image: String, message: String },

    /// Local existence check failed
    #[error("Existence check failed for {image}: {message}")]
    RegistryQuery { image: String, message: String },

    /// Pulling an image failed
    #[error("Pull of {image} failed: {source}")]
    Fetch {
        image: String,
        #[source]
        source: Box<SinkerError>,
    },

    /// The run deadline elapsed
    #[error("Operation timed out")]
    Timeout,

    /// The run was cancelled from outside
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cache error{}: {message}", at_path(.path))]
    Cache {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl SinkerError {
    /// Wraps a pull failure with the image it happened on.
    pub fn fetch(image: &str, source: SinkerError) -> Self {
        SinkerError::Fetch {
            image: image.to_string(),
            source: Box::new(source),
        }
    }

    /// True for deadline expiry or cancellation, also when wrapped by a pull.
    pub fn is_interrupted(&self) -> bool {
        match self {
            SinkerError::Timeout | SinkerError::Cancelled => true,
            SinkerError::Fetch { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }

    /// Image name the error is attached to, if any.
    pub fn image(&self) -> Option<&str> {
        match self {
            SinkerError::AuthResolution { image, .. }
            | SinkerError::RegistryQuery { image, .. }
            | SinkerError::Fetch { image, .. } => Some(image),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SinkerError {
    fn from(err: std::io::Error) -> Self {
        SinkerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SinkerError {
    fn from(err: serde_json::Error) -> Self {
        SinkerError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for SinkerError {
    fn from(err: serde_yaml::Error) -> Self {
        SinkerError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for SinkerError {
    fn from(err: reqwest::Error) -> Self {
        SinkerError::Network(err.to_string())
    }
}

impl From<url::ParseError> for SinkerError {
    fn from(err: url::ParseError) -> Self {
        SinkerError::Validation(err.to_string())
    }
}

impl From<base64::DecodeError> for SinkerError {
    fn from(err: base64::DecodeError) -> Self {
        SinkerError::Auth(format!("Malformed encoded credential: {}", err))
    }
}

impl From<std::string::FromUtf8Error> for SinkerError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        SinkerError::Parse(format!("UTF-8 conversion error: {}", err))
    }
}
