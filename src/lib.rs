//! # Depotguard
//!
//! **Security and ingress layer for the warehouse desktop app.**
//!
//! Depotguard accepts bank notifications relayed by a phone on the local
//! network, decides at startup whether the application is licensed, and
//! verifies signed application updates before they touch disk.
//!
//! ## Features
//!
//! - **Notification listener**: a local HTTP endpoint with method, media
//!   type, origin, shared-secret, body-size, payload and per-source rate
//!   gates; accepted notifications fan out to registered handlers
//! - **UI hand-off**: handlers run off the UI thread; the UI drains a
//!   bounded queue
//! - **Signed licenses**: RSA-PSS (SHA-256, max salt) or Ed25519 tokens with
//!   expiry and entitlement checks, enforced per environment
//! - **Signed updates**: package signature (and optional SHA-256) verified
//!   in memory; only a verified package can be staged
//!
//! ## Quickstart
//!
//! ```no_run
//! use depotguard::{Environment, GuardConfig, KeySource, Services, SystemClock};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), depotguard::DepotGuardError> {
//!     let config = GuardConfig::new(
//!         KeySource::Path("keys/license.pem".into()),
//!         KeySource::Path("keys/update.pem".into()),
//!     );
//!     let mut services = Services::build(config, Arc::new(SystemClock))?;
//!
//!     let key = std::env::var("LICENSE_KEY").ok();
//!     services.license.validate_startup(key.as_deref(), Environment::Production)?;
//!
//!     services.start_notifications()?;
//!     while let Some(notification) = services.ui_receiver.blocking_recv() {
//!         println!("{}", notification.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Threat Model
//!
//! Depotguard protects against:
//! - **Forged licenses**: tokens must verify against the embedded key
//! - **Tampered updates**: unsigned or modified packages never reach disk
//! - **LAN abuse**: oversized, malformed, unauthenticated and flooding
//!   requests are refused before any handler runs
//!
//! Update signatures cover the package bytes only. The manifest version is
//! not signed, so a hostile mirror can offer an older signed build under a
//! newer version number. Serve manifests over TLS from a trusted host.
//!
//! Depotguard does **not** prevent binary patching. Client-side licensing
//! can always be bypassed by a determined attacker with access to the
//! binary.

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Licensing
pub mod license;
pub mod policy;
pub mod manager;

// Updates
pub mod update;

// Notification ingress
pub mod notify;

// Composition root
pub mod services;

// Re-exports for public API
pub use clock::{Clock, SystemClock};
pub use config::{GuardConfig, KeySource, NotificationConfig, RateLimitConfig, UpdateClientConfig};
pub use crypto::verify::{SignatureAlgorithm, SignatureVerifier};
pub use errors::{DepotGuardError, ErrorClass};
pub use license::{LicenseClaims, LicenseRejection, LicenseValidator};
pub use manager::{Environment, LicenseManager, StartupLicense};
pub use notify::{
    ui_channel, HandlerError, HandlerId, NotificationHandler, NotificationKind,
    NotificationServer, ParsedNotification, UiReceiver,
};
pub use policy::access::SeatCaps;
pub use services::Services;
pub use update::{
    StagedUpdate, UpdateClient, UpdateManifest, UpdatePackage, UpdateStager, UpdateVerifier,
    VerifiedUpdate,
};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
