//! Composition root.
//!
//! Builds every long-lived component once from a [`GuardConfig`] and hands
//! them to the application as plain fields.

use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::crypto::verify::SignatureVerifier;
use crate::license::LicenseValidator;
use crate::manager::LicenseManager;
use crate::notify::{ui_channel, HandlerId, NotificationServer, UiReceiver, UiSender};
use crate::update::{UpdateClient, UpdateVerifier};
use crate::DepotGuardError;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// The application's security services.
#[derive(Debug)]
pub struct Services {
    /// Startup license gate and feature checks.
    pub license: LicenseManager,
    /// Update package verification.
    pub updates: UpdateVerifier,
    /// Update server client, when an update server is configured.
    pub update_client: Option<UpdateClient>,
    /// Notification listener, not yet started.
    pub notifications: NotificationServer,
    /// UI end of the notification queue.
    pub ui_receiver: UiReceiver,
    ui_sender: UiSender,
    ui_handler: Mutex<HandlerId>,
}

impl Services {
    /// Validate `config` and build every component.
    ///
    /// The listener is created stopped, with the UI queue already
    /// registered as its first handler.
    pub fn build(config: GuardConfig, clock: Arc<dyn Clock>) -> Result<Self, DepotGuardError> {
        config.validate()?;

        // 1. Trust anchors
        let license_verifier = SignatureVerifier::from_pem(&config.license_key.load()?)?;
        let update_verifier = SignatureVerifier::from_pem(&config.update_key.load()?)?;
        if license_verifier.fingerprint() == update_verifier.fingerprint() {
            tracing::warn!(
                fingerprint = %license_verifier.fingerprint(),
                "License and update keys are identical; use separate keys per trust boundary"
            );
        }

        // 2. Licensing
        let license = LicenseManager::with_policy(
            LicenseValidator::new(license_verifier, Arc::clone(&clock)),
            config.required_entitlements.clone(),
            config.expiry_warning_days,
        );

        // 3. Updates
        let updates = UpdateVerifier::new(update_verifier);
        let update_client = config
            .update_client_config()
            .map(UpdateClient::new)
            .transpose()?;

        // 4. Notifications
        let notifications = NotificationServer::new(config.notification.clone(), clock)?;
        let (ui_sender, ui_receiver) = ui_channel(config.ui_queue_capacity);
        let ui_handler = notifications.register_handler::<UiSender>(ui_sender.clone());

        tracing::info!(
            app = %config.app_name,
            version = %config.app_version,
            updates = update_client.is_some(),
            "Services initialized"
        );

        Ok(Self {
            license,
            updates,
            update_client,
            notifications,
            ui_receiver,
            ui_sender,
            ui_handler: Mutex::new(ui_handler),
        })
    }

    /// Start the listener, re-registering the UI queue first if a previous
    /// [`NotificationServer::stop`] dropped it.
    pub fn start_notifications(&self) -> Result<SocketAddr, DepotGuardError> {
        let mut ui_handler = self.ui_handler.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.notifications.is_registered(*ui_handler) {
            *ui_handler = self.notifications.register_handler(self.ui_sender.clone());
        }
        self.notifications.start()
    }
}
