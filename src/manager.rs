//! License Manager - the startup license gate.
//!
//! The `LicenseManager` decides whether the application may start:
//! - Development builds skip validation entirely
//! - Staging validates when a key is present but never blocks startup
//! - Production requires a valid, entitled license

use crate::license::{LicenseClaims, LicenseValidator};
use crate::policy::access::{check_entitlements, SeatCaps};
use crate::DepotGuardError;
use std::str::FromStr;
use std::sync::RwLock;

/// Deployment environment the application runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development; licensing is skipped.
    Development,
    /// Pre-production; licensing is advisory.
    Staging,
    /// Customer installs; licensing is enforced.
    Production,
}

impl FromStr for Environment {
    type Err = DepotGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(DepotGuardError::ConfigError(format!(
                "unknown environment: {:?}",
                other
            ))),
        }
    }
}

/// Outcome of the startup check when the application may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupLicense {
    /// A valid license was presented.
    Licensed(LicenseClaims),
    /// Staging without a usable license.
    Unlicensed,
    /// Development; no check performed.
    Skipped,
}

/// Startup license gate.
///
/// Create one instance per application and keep it for feature checks.
#[derive(Debug)]
pub struct LicenseManager {
    validator: LicenseValidator,
    required_entitlements: Vec<String>,
    expiry_warning_days: i64,
    license: RwLock<Option<LicenseClaims>>,
}

impl LicenseManager {
    /// Create a manager with no required entitlements and a 30 day warning.
    pub fn new(validator: LicenseValidator) -> Self {
        Self::with_policy(validator, Vec::new(), 30)
    }

    /// Create a manager with explicit entitlement and warning policy.
    pub fn with_policy(
        validator: LicenseValidator,
        required_entitlements: Vec<String>,
        expiry_warning_days: i64,
    ) -> Self {
        Self {
            validator,
            required_entitlements,
            expiry_warning_days,
            license: RwLock::new(None),
        }
    }

    /// Validate the license at startup.
    ///
    /// # Errors
    /// Production only:
    /// - `MissingLicense` - No license key provided
    /// - `InvalidLicense` - Token rejected (tamper, malformed or expired)
    /// - `EntitlementMissing` - Required entitlement not granted
    pub fn validate_startup(
        &self,
        license_key: Option<&str>,
        environment: Environment,
    ) -> Result<StartupLicense, DepotGuardError> {
        let license_key = license_key.map(str::trim).filter(|k| !k.is_empty());

        match environment {
            Environment::Development => {
                tracing::info!("License validation skipped in development mode");
                Ok(StartupLicense::Skipped)
            }
            Environment::Production => {
                let Some(key) = license_key else {
                    tracing::error!("License key required for production environment");
                    return Err(DepotGuardError::MissingLicense);
                };
                let claims = self.validator.validate(key)?;
                if let Err(err) = check_entitlements(&claims, &self.required_entitlements) {
                    tracing::error!(error = %err, "License lacks a required entitlement");
                    return Err(err);
                }
                self.accept(claims.clone());
                Ok(StartupLicense::Licensed(claims))
            }
            Environment::Staging => {
                let Some(key) = license_key else {
                    return Ok(StartupLicense::Unlicensed);
                };
                let validated = self.validator.validate(key).and_then(|claims| {
                    check_entitlements(&claims, &self.required_entitlements)?;
                    Ok(claims)
                });
                match validated {
                    Ok(claims) => {
                        tracing::info!("License validated for staging environment");
                        self.accept(claims.clone());
                        Ok(StartupLicense::Licensed(claims))
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Invalid license key in staging environment");
                        Ok(StartupLicense::Unlicensed)
                    }
                }
            }
        }
    }

    fn accept(&self, claims: LicenseClaims) {
        let days_left = claims.days_until_expiry(self.validator.now());
        tracing::info!(
            subject = %claims.subject(),
            days_left,
            "License accepted"
        );
        if days_left < self.expiry_warning_days {
            tracing::warn!(days_left, "License expires soon");
        }
        match self.license.write() {
            Ok(mut guard) => *guard = Some(claims),
            Err(poisoned) => *poisoned.into_inner() = Some(claims),
        }
    }

    /// The license accepted at startup, if any.
    pub fn license(&self) -> Option<LicenseClaims> {
        match self.license.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether the accepted license grants `feature`.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.license()
            .map(|claims| claims.has_entitlement(feature))
            .unwrap_or(false)
    }

    /// Whole days left on the accepted license.
    pub fn days_until_expiry(&self) -> Option<i64> {
        self.license()
            .map(|claims| claims.days_until_expiry(self.validator.now()))
    }

    /// Whether `users` active users fit the accepted license. Unlicensed
    /// installs are not limited here.
    pub fn allows_users(&self, users: u32) -> bool {
        self.license()
            .map(|claims| SeatCaps::from_claims(&claims).allows_users(users))
            .unwrap_or(true)
    }

    /// The underlying validator.
    pub fn validator(&self) -> &LicenseValidator {
        &self.validator
    }
}
