//! Detached signature verification.
//!
//! A [`SignatureVerifier`] wraps one public key. RSA keys verify
//! RSASSA-PSS with SHA-256, MGF1-SHA-256 and the maximum salt length
//! (`emLen - hLen - 2`), which is what the license and release tooling
//! produces. Ed25519 keys verify 64-byte signatures strictly.

use crate::crypto::keys::PublicKeyMaterial;
use crate::DepotGuardError;
use ed25519_dalek::Signature;
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Signature scheme bound to a verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PSS, SHA-256, MGF1-SHA-256, maximum salt length.
    RsaPssSha256,
    /// Ed25519 (strict).
    Ed25519,
}

#[derive(Debug)]
struct Inner {
    key: PublicKeyMaterial,
    fingerprint: String,
}

/// Verifies detached signatures against a single public key.
///
/// Immutable after construction and cheap to clone.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    inner: Arc<Inner>,
}

impl SignatureVerifier {
    /// Build a verifier from a PEM public key.
    ///
    /// Missing, malformed or weak keys are a configuration error.
    pub fn from_pem(pem: &str) -> Result<Self, DepotGuardError> {
        let key = PublicKeyMaterial::from_pem(pem)?;
        Self::from_key(key)
    }

    /// Build a verifier from an already decoded key.
    pub fn from_key(key: PublicKeyMaterial) -> Result<Self, DepotGuardError> {
        let fingerprint = key.fingerprint()?;
        let verifier = Self {
            inner: Arc::new(Inner { key, fingerprint }),
        };
        tracing::info!(
            fingerprint = %verifier.inner.fingerprint,
            algorithm = ?verifier.algorithm(),
            "Loaded signature verification key"
        );
        Ok(verifier)
    }

    /// The scheme this verifier checks.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self.inner.key {
            PublicKeyMaterial::Rsa(_) => SignatureAlgorithm::RsaPssSha256,
            PublicKeyMaterial::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Hex SHA-256 of the public key's DER encoding.
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// Check `signature` over `payload`.
    ///
    /// Returns `false` for any mismatch or malformed signature; never
    /// panics on untrusted input.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        if signature.is_empty() {
            return false;
        }
        match &self.inner.key {
            PublicKeyMaterial::Rsa(key) => verify_pss(key, payload, signature),
            PublicKeyMaterial::Ed25519(key) => {
                let Ok(signature) = Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_strict(payload, &signature).is_ok()
            }
        }
    }
}

const SHA256_LEN: usize = 32;

/// Largest PSS salt for this key and SHA-256.
pub(crate) fn pss_max_salt_len(key: &RsaPublicKey) -> usize {
    let em_bits = key.n().bits().saturating_sub(1);
    let em_len = em_bits.div_ceil(8);
    em_len.saturating_sub(SHA256_LEN + 2)
}

fn verify_pss(key: &RsaPublicKey, payload: &[u8], signature: &[u8]) -> bool {
    if signature.len() != key.size() {
        return false;
    }
    let hashed = Sha256::digest(payload);
    let scheme = Pss::new_with_salt::<Sha256>(pss_max_salt_len(key));
    key.verify(scheme, &hashed, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::RsaPrivateKey;

    const LICENSE_PUB: &str = include_str!("../../tests/fixtures/license_public_key.pem");
    const LICENSE_PRIV: &str = include_str!("../../tests/fixtures/license_signing_key.pem");
    const UPDATE_PUB: &str = include_str!("../../tests/fixtures/update_public_key.pem");
    const ED25519_PUB: &str = include_str!("../../tests/fixtures/update_ed25519_public_key.pem");
    const PAYLOAD: &[u8] = include_bytes!("../../tests/fixtures/license_payload.json");
    const PAYLOAD_SIG: &[u8] = include_bytes!("../../tests/fixtures/license_payload.sig");
    const PACKAGE: &[u8] = include_bytes!("../../tests/fixtures/update_package.bin");
    const PACKAGE_ED_SIG: &[u8] = include_bytes!("../../tests/fixtures/update_package.ed25519.sig");

    fn sign_pss(payload: &[u8], salt_len: usize) -> Vec<u8> {
        let key = RsaPrivateKey::from_pkcs8_pem(LICENSE_PRIV).unwrap();
        let digest = Sha256::digest(payload);
        key.sign_with_rng(
            &mut rand::thread_rng(),
            Pss::new_with_salt::<Sha256>(salt_len),
            &digest,
        )
        .unwrap()
    }

    #[test]
    fn test_openssl_max_salt_vector_verifies() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        assert_eq!(verifier.algorithm(), SignatureAlgorithm::RsaPssSha256);
        assert!(verifier.verify(PAYLOAD, PAYLOAD_SIG));
    }

    #[test]
    fn test_max_salt_for_2048_bit_key() {
        let key = match PublicKeyMaterial::from_pem(LICENSE_PUB).unwrap() {
            PublicKeyMaterial::Rsa(key) => key,
            PublicKeyMaterial::Ed25519(_) => unreachable!(),
        };
        assert_eq!(pss_max_salt_len(&key), 222);
    }

    #[test]
    fn test_fresh_signature_verifies() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        let sig = sign_pss(b"payload", 222);
        assert!(verifier.verify(b"payload", &sig));
        assert!(!verifier.verify(b"payloae", &sig));
    }

    #[test]
    fn test_digest_length_salt_rejected() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        let sig = sign_pss(b"payload", 32);
        assert!(!verifier.verify(b"payload", &sig));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let verifier = SignatureVerifier::from_pem(UPDATE_PUB).unwrap();
        assert!(!verifier.verify(PAYLOAD, PAYLOAD_SIG));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        let mut sig = PAYLOAD_SIG.to_vec();
        sig[17] ^= 0x01;
        assert!(!verifier.verify(PAYLOAD, &sig));
    }

    #[test]
    fn test_malformed_signatures_return_false() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        assert!(!verifier.verify(PAYLOAD, b""));
        assert!(!verifier.verify(PAYLOAD, b"short"));
        assert!(!verifier.verify(PAYLOAD, &[0u8; 256]));
        assert!(!verifier.verify(PAYLOAD, &[0xffu8; 512]));
    }

    #[test]
    fn test_ed25519_vector_verifies() {
        let verifier = SignatureVerifier::from_pem(ED25519_PUB).unwrap();
        assert_eq!(verifier.algorithm(), SignatureAlgorithm::Ed25519);
        assert!(verifier.verify(PACKAGE, PACKAGE_ED_SIG));
        assert!(!verifier.verify(&PACKAGE[1..], PACKAGE_ED_SIG));
        assert!(!verifier.verify(PACKAGE, &PACKAGE_ED_SIG[..63]));
    }

    #[test]
    fn test_clones_share_key() {
        let verifier = SignatureVerifier::from_pem(LICENSE_PUB).unwrap();
        let clone = verifier.clone();
        assert_eq!(verifier.fingerprint(), clone.fingerprint());
        assert!(clone.verify(PAYLOAD, PAYLOAD_SIG));
    }
}
