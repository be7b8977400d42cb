//! Entitlement and seat enforcement.
//!
//! This module enforces access policies based on:
//! - Required entitlements (all must be present)
//! - Seat limits (`max_users` from the license, when present)

use crate::license::LicenseClaims;
use crate::DepotGuardError;

/// Check that verified claims grant every required entitlement.
///
/// # Returns
/// * `Ok(())` - Access granted
/// * `Err(EntitlementMissing)` - First required entitlement not found
pub fn check_entitlements<S: AsRef<str>>(
    claims: &LicenseClaims,
    required: &[S],
) -> Result<(), DepotGuardError> {
    for code in required {
        let code = code.as_ref();
        if !claims.has_entitlement(code) {
            return Err(DepotGuardError::EntitlementMissing {
                code: code.to_string(),
            });
        }
    }
    Ok(())
}

/// Seat limit carried by a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatCaps {
    /// Maximum concurrent users (None = unlimited).
    pub max_users: Option<u32>,
}

impl SeatCaps {
    /// Extract the seat limit from claims.
    pub fn from_claims(claims: &LicenseClaims) -> Self {
        Self {
            max_users: claims.max_users(),
        }
    }

    /// Whether `users` active users fit within the limit.
    pub fn allows_users(&self, users: u32) -> bool {
        match self.max_users {
            Some(limit) => users <= limit,
            None => true,
        }
    }

    /// Check if any limit exists.
    pub fn has_cap(&self) -> bool {
        self.max_users.is_some()
    }
}
