//! Depotguard configuration.
//!
//! Settings are plain structs populated by the application's config provider
//! (they derive `Deserialize` with defaults) and checked once with
//! `validate()` before any component is built.

use crate::DepotGuardError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Package names of the banking apps whose notifications are forwarded.
///
/// Notifications carrying a `package` field outside this list are
/// acknowledged but not dispatched.
pub const DEFAULT_BANK_PACKAGES: &[&str] = &[
    "com.vnpay.wallet",
    "com.vietcombank.mobile",
    "com.techcombank.bb.app",
    "com.mbmobile",
    "com.vnpay.bidv",
    "com.acb.acbmobile",
    "com.tpb.mb.gprsandroid",
    "com.msb.mbanking",
    "com.vietinbank.ipay",
    "com.agribank.mobilebanking",
    "com.sacombank.mbanking",
    "com.hdbank.mobilebanking",
    "com.vpbank.mobilebanking",
    "com.ocb.mobilebanking",
    "com.shb.mobilebanking",
    "com.scb.mobilebanking",
    "com.seabank.mobilebanking",
    "com.vib.mobilebanking",
    "com.lienvietpostbank.mobilebanking",
    "com.bvbank.mobilebanking",
    "com.pvcombank.mobilebanking",
    "com.mservice.momotransfer",
];

/// Longest accepted rate limit window, in seconds (one day).
pub const MAX_RATE_WINDOW_SECS: u64 = 86_400;

/// Per-source rate limit settings for the notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per source within one window.
    pub threshold: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Upper bound on distinct sources tracked at once.
    pub max_tracked_sources: usize,
}

impl RateLimitConfig {
    /// Window length as a `chrono` duration, clamped to
    /// [`MAX_RATE_WINDOW_SECS`].
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs.min(MAX_RATE_WINDOW_SECS) as i64)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            window_secs: 60,
            max_tracked_sources: 4096,
        }
    }
}

/// Configuration for the notification listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Interface to bind (e.g. "0.0.0.0" so the phone on the LAN can reach it).
    pub host: String,

    /// Port to bind. `0` asks the OS for an ephemeral port.
    pub port: u16,

    /// Request path notifications are posted to.
    pub path: String,

    /// Allowed `Origin` header values. Empty disables the origin check.
    pub allowed_origins: Vec<String>,

    /// Accepted media types for the request body.
    pub accepted_content_types: Vec<String>,

    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,

    /// Per-source rate limit.
    pub rate_limit: RateLimitConfig,

    /// Shared secret the sender presents as `Authorization: Bearer <secret>`.
    /// SECURITY: `None` leaves the endpoint unauthenticated.
    pub shared_secret: Option<String>,

    /// Accepted sender app packages. Empty disables package filtering.
    pub package_allowlist: Vec<String>,

    /// How long `stop()` waits for in-flight requests, in milliseconds.
    pub drain_timeout_ms: u64,

    /// Worker threads for the listener runtime.
    pub worker_threads: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5005,
            path: "/".to_string(),
            allowed_origins: Vec::new(),
            accepted_content_types: vec!["application/json".to_string()],
            max_body_bytes: 10 * 1024,
            rate_limit: RateLimitConfig::default(),
            shared_secret: None,
            package_allowlist: DEFAULT_BANK_PACKAGES.iter().map(|p| p.to_string()).collect(),
            drain_timeout_ms: 5_000,
            worker_threads: 2,
        }
    }
}

impl NotificationConfig {
    /// Drain timeout as a `Duration`.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), DepotGuardError> {
        if self.host.trim().is_empty() {
            return Err(DepotGuardError::ConfigError(
                "notification host cannot be empty".to_string(),
            ));
        }
        // Privileged ports are refused; 0 means "pick one for me".
        if self.port != 0 && self.port < 1024 {
            return Err(DepotGuardError::ConfigError(format!(
                "invalid notification port: {}",
                self.port
            )));
        }
        if !self.path.starts_with('/') {
            return Err(DepotGuardError::ConfigError(format!(
                "notification path must start with '/', got {:?}",
                self.path
            )));
        }
        if self.path.contains(['{', '}', '*', ':']) {
            return Err(DepotGuardError::ConfigError(format!(
                "notification path must be a literal path, got {:?}",
                self.path
            )));
        }
        if self.accepted_content_types.is_empty() {
            return Err(DepotGuardError::ConfigError(
                "accepted_content_types cannot be empty".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(DepotGuardError::ConfigError(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.threshold == 0 || self.rate_limit.window_secs == 0 {
            return Err(DepotGuardError::ConfigError(
                "rate limit threshold and window must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.window_secs > MAX_RATE_WINDOW_SECS {
            return Err(DepotGuardError::ConfigError(format!(
                "rate limit window cannot exceed {} seconds, got {}",
                MAX_RATE_WINDOW_SECS, self.rate_limit.window_secs
            )));
        }
        if self.rate_limit.max_tracked_sources == 0 {
            return Err(DepotGuardError::ConfigError(
                "max_tracked_sources must be greater than zero".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(DepotGuardError::ConfigError(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.shared_secret, Some(secret) if secret.is_empty()) {
            return Err(DepotGuardError::ConfigError(
                "shared_secret cannot be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a PEM-encoded public key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// PEM text embedded in the application or config.
    Pem(String),
    /// Path to a PEM file shipped alongside the application.
    Path(PathBuf),
}

impl KeySource {
    /// Read the PEM text.
    pub fn load(&self) -> Result<String, DepotGuardError> {
        let pem = match self {
            KeySource::Pem(pem) => pem.clone(),
            KeySource::Path(path) => std::fs::read_to_string(path).map_err(|e| {
                DepotGuardError::ConfigError(format!(
                    "cannot read public key {}: {}",
                    path.display(),
                    e
                ))
            })?,
        };
        if pem.trim().is_empty() {
            return Err(DepotGuardError::ConfigError(
                "public key material is empty".to_string(),
            ));
        }
        Ok(pem)
    }
}

/// Settings for talking to the update server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClientConfig {
    /// Base URL of the update server (e.g. "https://updates.example.com").
    pub server_url: String,

    /// Application name reported in the User-Agent.
    pub app_name: String,

    /// Currently installed version.
    pub current_version: String,

    /// Timeout for the manifest request, in seconds.
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// Timeout for package downloads, in seconds.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Largest package accepted from the server, in bytes.
    #[serde(default = "default_max_package_bytes")]
    pub max_package_bytes: u64,
}

fn default_check_timeout_secs() -> u64 {
    10
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_max_package_bytes() -> u64 {
    512 * 1024 * 1024
}

impl UpdateClientConfig {
    /// Create a config with default timeouts and size limit.
    pub fn new(
        server_url: impl Into<String>,
        app_name: impl Into<String>,
        current_version: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            app_name: app_name.into(),
            current_version: current_version.into(),
            check_timeout_secs: default_check_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            max_package_bytes: default_max_package_bytes(),
        }
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), DepotGuardError> {
        if !(self.server_url.starts_with("https://") || self.server_url.starts_with("http://")) {
            return Err(DepotGuardError::ConfigError(format!(
                "update server_url must be an http(s) URL, got {:?}",
                self.server_url
            )));
        }
        if self.current_version.trim().is_empty() {
            return Err(DepotGuardError::ConfigError(
                "current_version cannot be empty".to_string(),
            ));
        }
        if self.max_package_bytes == 0 {
            return Err(DepotGuardError::ConfigError(
                "max_package_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level settings consumed by [`crate::services::Services::build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Notification listener settings.
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Public key that verifies license tokens.
    pub license_key: KeySource,

    /// Public key that verifies update packages.
    pub update_key: KeySource,

    /// Entitlements the license must carry in production.
    #[serde(default)]
    pub required_entitlements: Vec<String>,

    /// Days before expiry at which a warning is logged.
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,

    /// Capacity of the notification queue feeding the UI thread.
    #[serde(default = "default_ui_queue_capacity")]
    pub ui_queue_capacity: usize,

    /// Application name, reported to the update server.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Installed application version.
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Update server base URL. `None` disables update checks.
    #[serde(default)]
    pub update_server_url: Option<String>,
}

fn default_app_name() -> String {
    "depotguard".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_expiry_warning_days() -> i64 {
    30
}

fn default_ui_queue_capacity() -> usize {
    256
}

impl GuardConfig {
    /// Create a config with default listener settings and the given keys.
    pub fn new(license_key: KeySource, update_key: KeySource) -> Self {
        Self {
            notification: NotificationConfig::default(),
            license_key,
            update_key,
            required_entitlements: Vec::new(),
            expiry_warning_days: default_expiry_warning_days(),
            ui_queue_capacity: default_ui_queue_capacity(),
            app_name: default_app_name(),
            app_version: default_app_version(),
            update_server_url: None,
        }
    }

    /// Update client settings, when an update server is configured.
    pub fn update_client_config(&self) -> Option<UpdateClientConfig> {
        self.update_server_url.as_ref().map(|url| {
            UpdateClientConfig::new(url.clone(), self.app_name.clone(), self.app_version.clone())
        })
    }

    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), DepotGuardError> {
        self.notification.validate()?;
        if self.expiry_warning_days < 0 {
            return Err(DepotGuardError::ConfigError(
                "expiry_warning_days cannot be negative".to_string(),
            ));
        }
        if self.ui_queue_capacity == 0 {
            return Err(DepotGuardError::ConfigError(
                "ui_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(update) = self.update_client_config() {
            update.validate()?;
        }
        Ok(())
    }
}
