// src/version/mod.rs

//! Semantic version handling for holon revisions
//!
//! A holon carries two version notions: the human `version` string (semver)
//! and the monotonic `version_sequence` assigned by the ledger. This module
//! only deals with the former.

use crate::error::{Error, Result};
use semver::Version;
use std::cmp::Ordering;

/// Version given to a holon at creation when the caller supplies none
pub const INITIAL_VERSION: &str = "1.0.0";

/// Parse and validate a version string
///
/// Accepts full semver ("1.2.3", "1.2.3-beta.1") and the short forms
/// "1" and "1.2", which are padded with zeros.
pub fn parse(s: &str) -> Result<Version> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(Error::InvalidInput(format!("Invalid version '{}'", s)));
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
        *slot = part
            .parse::<u64>()
            .map_err(|e| Error::InvalidInput(format!("Invalid version '{}': {}", s, e)))?;
    }

    Ok(Version::new(numbers[0], numbers[1], numbers[2]))
}

/// Normalize a version string to canonical semver text
pub fn normalize(s: &str) -> Result<String> {
    Ok(parse(s)?.to_string())
}

/// Next patch release, dropping any pre-release or build metadata
pub fn bump_patch(s: &str) -> Result<String> {
    let v = parse(s)?;
    Ok(Version::new(v.major, v.minor, v.patch + 1).to_string())
}

/// Compare two version strings by semver precedence
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(parse(a)?.cmp(&parse(b)?))
}
