//! Signed license tokens.
//!
//! A token is `base64(payload_json) "." base64(signature)`. The validator
//! checks framing, encoding, signature, claims and the validity window in
//! that order.

pub mod claims;
mod token;
pub mod validator;

pub use claims::LicenseClaims;
pub use validator::LicenseValidator;

/// Internal reason a license token was rejected.
///
/// Logged for operators and exposed by [`LicenseValidator::check`]; callers
/// facing users should rely on [`LicenseValidator::validate`], which
/// reports all of these as one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LicenseRejection {
    /// Not two non-empty `.`-separated parts.
    #[error("malformed token")]
    Malformed,
    /// A part is not valid base64.
    #[error("invalid encoding")]
    Encoding,
    /// Signature does not verify over the payload.
    #[error("signature mismatch")]
    Signature,
    /// Payload is not valid claims JSON or lacks required fields.
    #[error("invalid claims")]
    Claims,
    /// Expiry is at or before the current time.
    #[error("expired")]
    Expired,
    /// Issue time is in the future.
    #[error("not yet valid")]
    NotYetValid,
}
