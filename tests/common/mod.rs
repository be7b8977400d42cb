//! Shared helpers for integration tests.

#![allow(dead_code)]

use depotguard::{
    HandlerError, NotificationConfig, NotificationServer, ParsedNotification, SystemClock,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LICENSE_PUB: &str = include_str!("../fixtures/license_public_key.pem");
pub const UPDATE_PUB: &str = include_str!("../fixtures/update_public_key.pem");
pub const UPDATE_ED25519_PUB: &str = include_str!("../fixtures/update_ed25519_public_key.pem");
pub const VALID_LICENSE: &str = include_str!("../fixtures/valid_license.token");
pub const PACKAGE: &[u8] = include_bytes!("../fixtures/update_package.bin");
pub const PACKAGE_SIG: &[u8] = include_bytes!("../fixtures/update_package.sig");
pub const PACKAGE_SHA256: &str = include_str!("../fixtures/update_package.sha256");

/// Listener config bound to loopback on an ephemeral port.
pub fn local_config() -> NotificationConfig {
    NotificationConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        drain_timeout_ms: 2_000,
        ..Default::default()
    }
}

/// A running listener with a recording handler.
pub struct Harness {
    pub server: NotificationServer,
    pub url: String,
    pub seen: Arc<Mutex<Vec<ParsedNotification>>>,
}

impl Harness {
    pub fn start(config: NotificationConfig) -> Self {
        let path = config.path.clone();
        let server = NotificationServer::new(config, Arc::new(SystemClock)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        server.register_handler(move |n: ParsedNotification| -> Result<(), HandlerError> {
            sink.lock().unwrap().push(n);
            Ok(())
        });
        let addr = server.start().unwrap();
        Self {
            server,
            url: format!("http://{}{}", addr, path),
            seen,
        }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.server.local_addr().unwrap())
    }

    pub fn seen(&self) -> Vec<ParsedNotification> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn json_body(response: reqwest::blocking::Response) -> serde_json::Value {
    response.json().unwrap()
}
