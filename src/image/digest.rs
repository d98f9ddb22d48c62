//! SHA256 digest utilities
//!
//! Blob digests are checked while streaming, so besides the one-shot helpers this
//! module offers [`DigestVerifier`], an incremental hasher bound to an expected digest.

use crate::error::{Result, SinkerError};
use sha2::{Digest, Sha256};

/// Utilities for working with SHA256 digests in Docker context
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute full Docker digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("sha256:{}", Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Extract SHA256 hex part from full Docker digest
    pub fn extract_hex_part(digest: &str) -> Result<&str> {
        match digest.strip_prefix("sha256:") {
            Some(hex_part) if Self::is_valid_sha256_hex(hex_part) => Ok(hex_part),
            Some(_) => Err(SinkerError::Validation(format!(
                "Invalid SHA256 hex part in digest: {}",
                digest
            ))),
            None => Err(SinkerError::Validation(format!(
                "Digest missing sha256: prefix: {}",
                digest
            ))),
        }
    }
}

/// Hashes data as it arrives and compares against the expected digest at the end.
pub struct DigestVerifier {
    expected: String,
    hasher: Sha256,
    bytes: u64,
}

impl DigestVerifier {
    pub fn new(expected: &str) -> Result<Self> {
        DigestUtils::extract_hex_part(expected)?;
        Ok(Self {
            expected: expected.to_string(),
            hasher: Sha256::new(),
            bytes: 0,
        })
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Returns the number of bytes seen when the digest matches.
    pub fn finish(self) -> Result<u64> {
        let actual = format!("sha256:{}", hex::encode(self.hasher.finalize()));
        if actual != self.expected {
            return Err(SinkerError::Validation(format!(
                "Blob digest mismatch. Expected: {}, Got: {}",
                self.expected, actual
            )));
        }
        Ok(self.bytes)
    }
}
