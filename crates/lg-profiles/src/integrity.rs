//! Filter list integrity checks using SHA-256 checksums
//!
//! Two checksums are involved. The stored checksum covers the raw bytes as
//! downloaded and tells a changed list from an identical one, and guards the
//! local cache against corruption. A declared checksum is published inside
//! the list itself (`! Checksum: sha256:...`) and covers the list body.

use ring::digest::{Context, SHA256};
use thiserror::Error;

use lg_compiler::{checksum_body, declared_checksum};

const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of content as `sha256:<hex>`.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    format!("{}{}", PREFIX, hex::encode(digest.as_ref()))
}

/// Verify content against a `sha256:<hex>` checksum.
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), IntegrityError> {
    let expected_hex = expected
        .strip_prefix(PREFIX)
        .ok_or(IntegrityError::InvalidFormat)?
        .to_ascii_lowercase();

    let actual = compute_checksum(data);
    let actual_hex = &actual[PREFIX.len()..];

    if actual_hex == expected_hex {
        Ok(())
    } else {
        Err(IntegrityError::ChecksumMismatch {
            expected: expected_hex,
            actual: actual_hex.to_string(),
        })
    }
}

/// Verify the checksum a list declares about itself, if it declares one we
/// can check. Legacy MD5 declarations are skipped.
pub fn verify_declared_checksum(text: &str) -> Result<(), IntegrityError> {
    match declared_checksum(text) {
        Some(declared) if declared.starts_with(PREFIX) => {
            verify_checksum(checksum_body(text).as_bytes(), declared)
        }
        Some(_) => {
            log::debug!("Ignoring unverifiable declared checksum");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Errors that can occur during integrity verification
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Checksum format is invalid (missing "sha256:" prefix)
    #[error("Invalid checksum format, expected 'sha256:...'")]
    InvalidFormat,

    /// Computed checksum doesn't match expected checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hash() {
        let expected = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert_eq!(compute_checksum(b"hello world"), expected);
        assert!(verify_checksum(b"hello world", expected).is_ok());
        assert!(verify_checksum(b"hello world", &expected.to_ascii_uppercase().replace("SHA256:", "sha256:")).is_ok());
    }

    #[test]
    fn test_mismatch_and_format() {
        assert!(matches!(
            verify_checksum(b"hello", "sha256:00"),
            Err(IntegrityError::ChecksumMismatch { .. })
        ));
        assert!(matches!(verify_checksum(b"hello", "md5:00"), Err(IntegrityError::InvalidFormat)));
    }

    #[test]
    fn test_declared_checksum() {
        let body = "[Adblock Plus 2.0]\n||ads.example^\n";
        let declared = compute_checksum(body.as_bytes());
        let text = format!("[Adblock Plus 2.0]\r\n! Checksum: {declared}\r\n\r\n||ads.example^\r\n");
        assert!(verify_declared_checksum(&text).is_ok());

        let tampered = text.replace("ads.example", "ads.exampl3");
        assert!(verify_declared_checksum(&tampered).is_err());
    }

    #[test]
    fn test_legacy_declared_checksum_is_skipped() {
        let text = "[Adblock Plus 2.0]\n! Checksum: 5fkeT4vbTlqlA4ZsCxLoeQ\n||ads.example^\n";
        assert!(verify_declared_checksum(text).is_ok());
        assert!(verify_declared_checksum("||ads.example^\n").is_ok());
    }
}
