//! Standardized mapping of registry HTTP failures to errors

use crate::error::SinkerError;
use reqwest::StatusCode;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle authentication-related HTTP errors
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> SinkerError {
        let error_msg = match status.as_u16() {
            400 => "Invalid token request parameters".to_string(),
            401 => "Invalid credentials provided".to_string(),
            403 => "Access denied - insufficient permissions".to_string(),
            404 => "Authentication endpoint not found".to_string(),
            _ => format!("Authentication failed (status {}): {}", status, error_text),
        };

        SinkerError::Auth(error_msg)
    }

    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> SinkerError {
        let error_msg = match status.as_u16() {
            401 => format!(
                "Unauthorized to perform {} operation: {}",
                operation, error_text
            ),
            403 => format!(
                "Forbidden: insufficient permissions for {}: {}",
                operation, error_text
            ),
            404 => return SinkerError::NotFound(format!("{}: {}", operation, error_text)),
            429 => format!("Rate limited during {}: {}", operation, error_text),
            500 => format!("Registry server error during {}: {}", operation, error_text),
            502 | 503 => format!("Registry unavailable for {}: {}", operation, error_text),
            _ => format!("{} failed (status {}): {}", operation, status, error_text),
        };

        SinkerError::Registry(error_msg)
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> SinkerError {
        if error.is_timeout() {
            SinkerError::Network(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            SinkerError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            SinkerError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            SinkerError::Network(format!("{} network error: {}", context, error))
        }
    }
}
