//! Depotguard error types.
//!
//! Every fallible operation returns [`DepotGuardError`]. Each variant belongs
//! to one [`ErrorClass`], which tells the caller whether to abort startup,
//! surface a generic message, or retry later.

use thiserror::Error;

/// Coarse error taxonomy used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal at startup: the application must not start.
    Configuration,
    /// Per-request or per-input rejection; recoverable.
    Validation,
    /// Tampered or untrusted license/update material.
    Security,
    /// Temporary condition; the caller may retry with backoff.
    Transient,
}

/// Errors produced by depotguard.
#[derive(Debug, Error)]
pub enum DepotGuardError {
    /// Configuration or key material is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The notification listener could not bind its address.
    #[error("Cannot bind notification listener on {addr}: {source}")]
    BindError {
        /// The address that was requested.
        addr: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The async runtime backing the listener could not be created.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// No license key provided where one is required.
    #[error("No license key provided")]
    MissingLicense,

    /// License is invalid or expired.
    #[error("Invalid or expired license")]
    InvalidLicense,

    /// Required entitlement is missing.
    #[error("Required entitlement missing: {code}")]
    EntitlementMissing {
        /// The entitlement code that was required but missing.
        code: String,
    },

    /// Update package failed verification.
    #[error("Invalid update package")]
    InvalidUpdate,

    /// HTTP transport error talking to the update server.
    #[error("Update transport error: {0}")]
    UpdateTransport(String),

    /// Update server answered with something unusable.
    #[error("Update protocol error: {0}")]
    UpdateProtocol(String),

    /// Staging or launching an update failed on disk.
    #[error("Update I/O error: {0}")]
    UpdateIO(String),
}

impl DepotGuardError {
    /// Classify this error for propagation decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ConfigError(_) => ErrorClass::Configuration,
            Self::BindError { .. } | Self::Runtime(_) | Self::UpdateTransport(_) => {
                ErrorClass::Transient
            }
            Self::MissingLicense | Self::EntitlementMissing { .. } | Self::UpdateProtocol(_) => {
                ErrorClass::Validation
            }
            Self::InvalidLicense | Self::InvalidUpdate => ErrorClass::Security,
            Self::UpdateIO(_) => ErrorClass::Transient,
        }
    }

    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::BindError {
            addr: addr.into(),
            source,
        }
    }
}
