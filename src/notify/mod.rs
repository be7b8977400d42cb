//! Local notification listener.
//!
//! The companion phone app posts bank notifications to this endpoint over
//! the LAN. Requests pass the gates in [`gates`], are dispatched to every
//! registered handler on the blocking pool, and reach the UI only through
//! the [`bridge`] queue.

pub mod bridge;
pub mod gates;
pub mod rate_limit;
pub mod registry;
pub mod request;
pub mod server;

pub use bridge::{ui_channel, UiReceiver, UiSender};
pub use gates::Rejection;
pub use rate_limit::{RateDecision, RateLimiter};
pub use registry::{DispatchReport, HandlerError, HandlerId, HandlerRegistry, NotificationHandler};
pub use request::{NotificationKind, ParsedNotification};
pub use server::NotificationServer;
