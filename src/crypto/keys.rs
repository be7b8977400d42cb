//! Public key loading.
//!
//! Keys arrive as SubjectPublicKeyInfo PEM (`-----BEGIN PUBLIC KEY-----`).
//! RSA keys may also be PKCS#1 (`-----BEGIN RSA PUBLIC KEY-----`).

use crate::DepotGuardError;
use ed25519_dalek::VerifyingKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

/// Smallest RSA modulus accepted, in bits.
pub const MIN_RSA_BITS: usize = 2048;

/// A decoded public key.
#[derive(Debug, Clone)]
pub enum PublicKeyMaterial {
    /// RSA key used with PSS/SHA-256.
    Rsa(RsaPublicKey),
    /// Ed25519 key.
    Ed25519(VerifyingKey),
}

impl PublicKeyMaterial {
    /// Parse a PEM public key.
    pub fn from_pem(pem: &str) -> Result<Self, DepotGuardError> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(DepotGuardError::ConfigError(
                "public key is empty".to_string(),
            ));
        }

        if pem.starts_with("-----BEGIN RSA PUBLIC KEY-----") {
            let key = RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| {
                DepotGuardError::ConfigError(format!("Invalid RSA public key: {}", e))
            })?;
            return Self::checked_rsa(key);
        }

        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Self::checked_rsa(key);
        }

        <VerifyingKey as ed25519_dalek::pkcs8::DecodePublicKey>::from_public_key_pem(pem)
            .map(PublicKeyMaterial::Ed25519)
            .map_err(|e| {
                DepotGuardError::ConfigError(format!(
                    "Unsupported or malformed public key: {}",
                    e
                ))
            })
    }

    fn checked_rsa(key: RsaPublicKey) -> Result<Self, DepotGuardError> {
        let bits = key.n().bits();
        if bits < MIN_RSA_BITS {
            return Err(DepotGuardError::ConfigError(format!(
                "RSA public key too small: {} bits (minimum {})",
                bits, MIN_RSA_BITS
            )));
        }
        Ok(PublicKeyMaterial::Rsa(key))
    }

    /// Hex SHA-256 of the DER-encoded SubjectPublicKeyInfo.
    pub fn fingerprint(&self) -> Result<String, DepotGuardError> {
        let der: Result<Vec<u8>, String> = match self {
            PublicKeyMaterial::Rsa(key) => key
                .to_public_key_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| e.to_string()),
            PublicKeyMaterial::Ed25519(key) => {
                ed25519_dalek::pkcs8::EncodePublicKey::to_public_key_der(key)
                    .map(|doc| doc.as_bytes().to_vec())
                    .map_err(|e| e.to_string())
            }
        };
        let der = der.map_err(|e| {
            DepotGuardError::ConfigError(format!("Cannot encode public key: {}", e))
        })?;
        Ok(hex::encode(Sha256::digest(&der)))
    }
}
