//! Update packages, the server manifest and version ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Release metadata served at `<base>/api/updates/latest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    /// Release version, dotted numeric (e.g. "2.1.0").
    pub version: String,
    /// Where the package bytes live.
    pub download_url: String,
    /// Where the detached signature lives.
    pub signature_url: String,
    /// Human-readable release notes.
    #[serde(default)]
    pub release_notes: String,
    /// Declared package size in bytes (0 when unknown).
    #[serde(default)]
    pub file_size: u64,
    /// Declared SHA-256 of the package, hex (empty when absent).
    #[serde(default)]
    pub checksum: String,
}

/// A fetched update: package bytes plus detached signature.
///
/// Nothing in this crate writes or runs an `UpdatePackage`; it must first
/// be sealed into a [`crate::update::VerifiedUpdate`].
#[derive(Clone, PartialEq, Eq)]
pub struct UpdatePackage {
    /// Package bytes.
    pub payload: Vec<u8>,
    /// Detached signature over `payload`.
    pub signature: Vec<u8>,
    /// Version the server claims this package is.
    pub declared_version: String,
    /// Declared SHA-256 of `payload`, hex.
    pub checksum: Option<String>,
}

impl std::fmt::Debug for UpdatePackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePackage")
            .field("payload_len", &self.payload.len())
            .field("signature_len", &self.signature.len())
            .field("declared_version", &self.declared_version)
            .field("checksum", &self.checksum)
            .finish()
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare dotted numeric versions, padding the shorter with zeros.
///
/// Returns `None` if either side is not purely numeric.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let mut a = parse_version(a)?;
    let mut b = parse_version(b)?;
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    Some(a.cmp(&b))
}

/// Whether `candidate` is strictly newer than `current`.
///
/// Unparseable versions are never newer.
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    match compare_versions(candidate, current) {
        Some(ordering) => ordering == Ordering::Greater,
        None => {
            tracing::warn!(candidate, current, "Invalid version format");
            false
        }
    }
}
