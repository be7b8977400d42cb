//! Update package verification.
//!
//! [`UpdateVerifier::seal`] is the only constructor of [`VerifiedUpdate`],
//! and the stager only accepts a `VerifiedUpdate`. Verification therefore
//! completes in memory before any package byte reaches disk.

use super::package::UpdatePackage;
use crate::crypto::digest::{checksum_matches, sha256_hex};
use crate::crypto::verify::SignatureVerifier;
use crate::DepotGuardError;

/// Internal reason an update package was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UpdateRejection {
    /// Payload or signature is empty.
    #[error("empty package or signature")]
    Empty,
    /// Declared SHA-256 does not match the payload.
    #[error("checksum mismatch")]
    Checksum,
    /// Signature does not verify over the payload.
    #[error("signature mismatch")]
    Signature,
}

/// An update package whose signature has been verified.
#[derive(Debug, Clone)]
pub struct VerifiedUpdate {
    package: UpdatePackage,
    sha256: String,
}

impl VerifiedUpdate {
    /// Verified package bytes.
    pub fn payload(&self) -> &[u8] {
        &self.package.payload
    }

    /// Declared version of the verified package.
    pub fn version(&self) -> &str {
        &self.package.declared_version
    }

    /// SHA-256 of the verified payload, hex.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Verifies update packages against the update signing key.
#[derive(Debug, Clone)]
pub struct UpdateVerifier {
    verifier: SignatureVerifier,
}

impl UpdateVerifier {
    /// Create a verifier bound to the update signing key.
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self { verifier }
    }

    /// Verify a package. Every failure is reported as `InvalidUpdate`.
    pub fn verify(&self, package: &UpdatePackage) -> Result<(), DepotGuardError> {
        self.check(package)
            .map_err(|_| DepotGuardError::InvalidUpdate)
    }

    /// Verify a package, exposing the internal rejection reason.
    pub fn check(&self, package: &UpdatePackage) -> Result<(), UpdateRejection> {
        let result = self.run_checks(package);
        match result {
            Ok(()) => tracing::info!(
                version = %package.declared_version,
                size = package.payload.len(),
                "Update package verified"
            ),
            Err(reason) => tracing::error!(
                version = %package.declared_version,
                reason = %reason,
                "Update package rejected"
            ),
        }
        result
    }

    fn run_checks(&self, package: &UpdatePackage) -> Result<(), UpdateRejection> {
        // 1. Shape
        if package.payload.is_empty() || package.signature.is_empty() {
            return Err(UpdateRejection::Empty);
        }

        // 2. Declared checksum, when present
        if let Some(declared) = package.checksum.as_deref().filter(|c| !c.trim().is_empty()) {
            if !checksum_matches(&package.payload, declared) {
                return Err(UpdateRejection::Checksum);
            }
        }

        // 3. Signature over the full payload. `declared_version` is not
        // covered.
        if !self.verifier.verify(&package.payload, &package.signature) {
            return Err(UpdateRejection::Signature);
        }

        Ok(())
    }

    /// Verify and take ownership of a package, producing the only type the
    /// stager accepts.
    pub fn seal(&self, package: UpdatePackage) -> Result<VerifiedUpdate, DepotGuardError> {
        self.verify(&package)?;
        let sha256 = sha256_hex(&package.payload);
        Ok(VerifiedUpdate { package, sha256 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPDATE_PUB: &str = include_str!("../../tests/fixtures/update_public_key.pem");
    const LICENSE_PUB: &str = include_str!("../../tests/fixtures/license_public_key.pem");
    const ED25519_PUB: &str = include_str!("../../tests/fixtures/update_ed25519_public_key.pem");
    const PACKAGE: &[u8] = include_bytes!("../../tests/fixtures/update_package.bin");
    const PACKAGE_SIG: &[u8] = include_bytes!("../../tests/fixtures/update_package.sig");
    const PACKAGE_ED_SIG: &[u8] = include_bytes!("../../tests/fixtures/update_package.ed25519.sig");
    const PACKAGE_SHA256: &str = include_str!("../../tests/fixtures/update_package.sha256");

    fn package(signature: &[u8], checksum: Option<&str>) -> UpdatePackage {
        UpdatePackage {
            payload: PACKAGE.to_vec(),
            signature: signature.to_vec(),
            declared_version: "2.1.0".to_string(),
            checksum: checksum.map(str::to_string),
        }
    }

    fn verifier(pem: &str) -> UpdateVerifier {
        UpdateVerifier::new(SignatureVerifier::from_pem(pem).unwrap())
    }

    #[test]
    fn test_valid_package_with_checksum() {
        let v = verifier(UPDATE_PUB);
        assert!(v.verify(&package(PACKAGE_SIG, Some(PACKAGE_SHA256))).is_ok());
        assert!(v.verify(&package(PACKAGE_SIG, None)).is_ok());
    }

    #[test]
    fn test_ed25519_package() {
        let v = verifier(ED25519_PUB);
        assert!(v.verify(&package(PACKAGE_ED_SIG, Some(PACKAGE_SHA256))).is_ok());
        assert_eq!(
            v.check(&package(PACKAGE_SIG, None)).unwrap_err(),
            UpdateRejection::Signature
        );
    }

    #[test]
    fn test_checksum_mismatch() {
        let v = verifier(UPDATE_PUB);
        let wrong = sha256_hex(b"other");
        assert_eq!(
            v.check(&package(PACKAGE_SIG, Some(&wrong))).unwrap_err(),
            UpdateRejection::Checksum
        );
    }

    #[test]
    fn test_license_key_does_not_verify_updates() {
        let v = verifier(LICENSE_PUB);
        assert!(matches!(
            v.verify(&package(PACKAGE_SIG, None)),
            Err(DepotGuardError::InvalidUpdate)
        ));
    }

    #[test]
    fn test_empty_parts_rejected() {
        let v = verifier(UPDATE_PUB);
        assert_eq!(
            v.check(&package(b"", None)).unwrap_err(),
            UpdateRejection::Empty
        );
        let mut empty_payload = package(PACKAGE_SIG, None);
        empty_payload.payload.clear();
        assert_eq!(v.check(&empty_payload).unwrap_err(), UpdateRejection::Empty);
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let v = verifier(UPDATE_PUB);
        let mut tampered = package(PACKAGE_SIG, None);
        tampered.payload[2048] ^= 0x80;
        assert_eq!(v.check(&tampered).unwrap_err(), UpdateRejection::Signature);
    }

    #[test]
    fn test_seal_records_digest() {
        let v = verifier(UPDATE_PUB);
        let sealed = v.seal(package(PACKAGE_SIG, Some(PACKAGE_SHA256))).unwrap();
        assert_eq!(sealed.sha256(), PACKAGE_SHA256.trim());
        assert_eq!(sealed.version(), "2.1.0");
        assert_eq!(sealed.payload().len(), PACKAGE.len());

        assert!(v.seal(package(b"nope", None)).is_err());
    }

    #[test]
    fn test_declared_version_is_not_authenticated() {
        let mut relabelled = package(PACKAGE_SIG, Some(PACKAGE_SHA256));
        relabelled.declared_version = "9.9.9".to_string();
        let sealed = verifier(UPDATE_PUB).seal(relabelled).unwrap();
        assert_eq!(sealed.version(), "9.9.9");
    }
}
