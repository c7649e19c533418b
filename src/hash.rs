// src/hash.rs

//! SHA-256 hashing for package integrity
//!
//! Every published package records the sha256 of its bytes; stores verify
//! it on read and installs verify it before extraction.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Compute the hex SHA-256 of a byte slice
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the hex SHA-256 of everything a reader yields
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verification result error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sha256 mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Verify bytes match an expected SHA-256
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<(), VerifyError> {
    let actual = sha256(data);
    if actual == expected.to_lowercase() {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Verify a file matches an expected SHA-256
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn verify_file_sha256(path: &Path, expected: &str) -> io::Result<Result<(), VerifyError>> {
    let mut file = std::fs::File::open(path)?;
    let actual = sha256_reader(&mut file)?;
    if actual == expected.to_lowercase() {
        Ok(Ok(()))
    } else {
        Ok(Err(VerifyError {
            expected: expected.to_string(),
            actual,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(sha256(b"hello world"), HELLO_WORLD);
        assert_eq!(sha256_reader(&mut &b"hello world"[..]).unwrap(), HELLO_WORLD);
    }

    #[test]
    fn test_verify_accepts_uppercase() {
        assert!(verify_sha256(b"hello world", &HELLO_WORLD.to_uppercase()).is_ok());
        let err = verify_sha256(b"hello", HELLO_WORLD).unwrap_err();
        assert_eq!(err.expected, HELLO_WORLD);
        assert!(err.to_string().starts_with("sha256 mismatch"));
    }

    #[test]
    fn test_verify_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        assert!(verify_file_sha256(file.path(), HELLO_WORLD).unwrap().is_ok());
        assert!(verify_file_sha256(file.path(), "00").unwrap().is_err());
    }
}
