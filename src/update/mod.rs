//! Signed application updates.
//!
//! Lifecycle: fetched ([`UpdatePackage`]) → verified ([`VerifiedUpdate`])
//! → staged ([`StagedUpdate`]) → launched, or discarded at any point.

pub mod client;
pub mod package;
pub mod stage;
pub mod verifier;

pub use client::UpdateClient;
pub use package::{is_newer_version, UpdateManifest, UpdatePackage};
pub use stage::{StagedUpdate, UpdateStager, DEFAULT_INSTALLER_ARGS};
pub use verifier::{UpdateRejection, UpdateVerifier, VerifiedUpdate};
