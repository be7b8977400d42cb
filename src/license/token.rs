//! License token framing: `base64(payload).base64(signature)`.

use super::LicenseRejection;
use base64::{engine::general_purpose::STANDARD, Engine};

/// A token split and decoded, not yet verified.
#[derive(Debug, Clone)]
pub(crate) struct LicenseToken {
    pub(crate) payload: Vec<u8>,
    pub(crate) signature: Vec<u8>,
}

impl LicenseToken {
    /// Split on `.` and decode both halves.
    ///
    /// The payload bytes are kept exactly as decoded; the signature covers
    /// them, not any re-serialization.
    pub(crate) fn parse(raw: &str) -> Result<Self, LicenseRejection> {
        let raw = raw.trim();
        let mut parts = raw.split('.');
        let (Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(LicenseRejection::Malformed);
        };
        if payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(LicenseRejection::Malformed);
        }

        let payload = STANDARD
            .decode(payload_b64)
            .map_err(|_| LicenseRejection::Encoding)?;
        let signature = STANDARD
            .decode(signature_b64)
            .map_err(|_| LicenseRejection::Encoding)?;

        Ok(Self { payload, signature })
    }
}
