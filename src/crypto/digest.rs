//! SHA-256 checksums for update packages.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Compare `bytes` against a declared hex SHA-256 checksum.
///
/// The declared value is trimmed and compared case-insensitively.
/// Malformed hex never matches.
pub fn checksum_matches(bytes: &[u8], declared_hex: &str) -> bool {
    let Ok(declared) = hex::decode(declared_hex.trim()) else {
        return false;
    };
    let computed = Sha256::digest(bytes);
    declared.len() == computed.len() && bool::from(computed.as_slice().ct_eq(&declared))
}
