//! Reqwest-based HTTP client for the update server.
//!
//! Fetches the release manifest, the package and its detached signature.
//! Nothing here verifies or writes anything; the caller hands the returned
//! [`UpdatePackage`] to [`crate::update::UpdateVerifier::seal`].

use super::package::{is_newer_version, UpdateManifest, UpdatePackage};
use crate::config::UpdateClientConfig;
use crate::DepotGuardError;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use std::io::Read;
use std::time::Duration;

/// Largest detached signature accepted.
const MAX_SIGNATURE_BYTES: u64 = 16 * 1024;

/// Largest manifest document accepted.
const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

/// Update server HTTP client.
#[derive(Debug)]
pub struct UpdateClient {
    check_client: Client,
    download_client: Client,
    config: UpdateClientConfig,
    base_url: String,
    user_agent: String,
}

impl UpdateClient {
    /// Create a new update client from config.
    pub fn new(config: UpdateClientConfig) -> Result<Self, DepotGuardError> {
        config.validate()?;

        let check_client = Client::builder()
            .timeout(Duration::from_secs(config.check_timeout_secs))
            .build()
            .map_err(|e| {
                DepotGuardError::UpdateTransport(format!("Failed to create client: {}", e))
            })?;
        let download_client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| {
                DepotGuardError::UpdateTransport(format!("Failed to create client: {}", e))
            })?;

        Ok(Self {
            check_client,
            download_client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            user_agent: build_user_agent(&config),
            config,
        })
    }

    /// URL of the release manifest.
    pub fn manifest_url(&self) -> String {
        format!("{}/api/updates/latest", self.base_url)
    }

    /// Ask the server for the latest release.
    ///
    /// Returns `Some(manifest)` only when the release is newer than the
    /// installed version.
    pub fn check_for_update(&self) -> Result<Option<UpdateManifest>, DepotGuardError> {
        let url = self.manifest_url();
        tracing::info!(url = %url, "Checking for updates");

        let response = self
            .check_client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| DepotGuardError::UpdateTransport(format!("Request failed: {}", e)))?;
        let response = ensure_success(response)?;

        let body = read_limited(response, MAX_MANIFEST_BYTES)?;
        let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            DepotGuardError::UpdateProtocol(format!("Invalid manifest JSON: {}", e))
        })?;

        if value.get("version").and_then(|v| v.as_str()).is_none() {
            tracing::warn!("No version information in update response");
            return Ok(None);
        }
        let manifest: UpdateManifest = serde_json::from_value(value).map_err(|e| {
            DepotGuardError::UpdateProtocol(format!("Invalid manifest: {}", e))
        })?;

        if is_newer_version(&manifest.version, &self.config.current_version) {
            tracing::info!(
                version = %manifest.version,
                current = %self.config.current_version,
                "Update available"
            );
            Ok(Some(manifest))
        } else {
            tracing::info!("Application is up to date");
            Ok(None)
        }
    }

    /// Download the package and signature described by `manifest`.
    ///
    /// The result is unverified.
    pub fn download(&self, manifest: &UpdateManifest) -> Result<UpdatePackage, DepotGuardError> {
        if manifest.file_size > self.config.max_package_bytes {
            return Err(DepotGuardError::UpdateProtocol(format!(
                "Declared package size {} exceeds limit {}",
                manifest.file_size, self.config.max_package_bytes
            )));
        }

        tracing::info!(url = %manifest.download_url, "Downloading update");
        let payload = self.fetch(&manifest.download_url, self.config.max_package_bytes)?;

        tracing::info!(url = %manifest.signature_url, "Downloading signature");
        let signature = self.fetch(&manifest.signature_url, MAX_SIGNATURE_BYTES)?;

        let checksum = Some(manifest.checksum.trim().to_string()).filter(|c| !c.is_empty());

        Ok(UpdatePackage {
            payload,
            signature,
            declared_version: manifest.version.clone(),
            checksum,
        })
    }

    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, DepotGuardError> {
        let response = self
            .download_client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|e| DepotGuardError::UpdateTransport(format!("Download failed: {}", e)))?;
        let response = ensure_success(response)?;

        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(DepotGuardError::UpdateProtocol(format!(
                    "Response of {} bytes exceeds limit {}",
                    length, limit
                )));
            }
        }
        read_limited(response, limit)
    }

    /// The User-Agent sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

fn ensure_success(response: Response) -> Result<Response, DepotGuardError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(DepotGuardError::UpdateTransport(format!(
            "Update server returned status {}",
            status.as_u16()
        )));
    }
    if !status.is_success() {
        return Err(DepotGuardError::UpdateProtocol(format!(
            "Update server returned status {}",
            status.as_u16()
        )));
    }
    Ok(response)
}

fn read_limited(response: Response, limit: u64) -> Result<Vec<u8>, DepotGuardError> {
    let mut body = Vec::new();
    response
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| DepotGuardError::UpdateTransport(format!("Failed to read body: {}", e)))?;
    if body.len() as u64 > limit {
        return Err(DepotGuardError::UpdateProtocol(format!(
            "Response exceeds limit of {} bytes",
            limit
        )));
    }
    Ok(body)
}

/// Build a User-Agent string from config.
///
/// Format: `depotguard-<version> <app>/<app-version>`
/// Example: `depotguard-0.1.0 kho-hang/2.0.0`
pub fn build_user_agent(config: &UpdateClientConfig) -> String {
    format!(
        "depotguard-{} {}/{}",
        env!("CARGO_PKG_VERSION"),
        config.app_name,
        config.current_version
    )
}
