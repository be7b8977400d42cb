//! Standalone notification listener.
//!
//! Starts the listener and prints every accepted notification, which is
//! handy when pairing the companion phone app.
//!
//! Usage:
//!   cargo run --example notify_listener -- --port 5005 --secret s3cret

use clap::Parser;
use depotguard::{ui_channel, NotificationConfig, NotificationKind, NotificationServer, SystemClock};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "notify-listener")]
#[command(about = "Receive bank notifications relayed by the phone app")]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "5005")]
    port: u16,

    /// Request path
    #[arg(long, default_value = "/")]
    path: String,

    /// Shared secret expected as a bearer token
    #[arg(short, long)]
    secret: Option<String>,

    /// Accept notifications from any app, not only banks
    #[arg(long)]
    any_package: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), depotguard::DepotGuardError> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = NotificationConfig {
        host: args.host,
        port: args.port,
        path: args.path,
        shared_secret: args.secret,
        ..Default::default()
    };
    if args.any_package {
        config.package_allowlist.clear();
    }

    let server = NotificationServer::new(config, Arc::new(SystemClock))?;
    let (sender, mut receiver) = ui_channel(256);
    server.register_handler(sender);
    let addr = server.start()?;
    info!(addr = %addr, "Waiting for notifications (Ctrl-C to quit)");

    while let Some(notification) = receiver.blocking_recv() {
        match notification.kind {
            NotificationKind::Ping => println!("[{}] ping from {}", notification.received_at, notification.source),
            NotificationKind::Message => println!(
                "[{}] {} {}: {}",
                notification.received_at,
                notification.source,
                notification.package.as_deref().unwrap_or("-"),
                notification.content
            ),
        }
    }
    Ok(())
}
