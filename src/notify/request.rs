//! Per-request data: the transport view of a request and the notification
//! it turns into once every gate has passed.

use axum::http::{header, HeaderMap, Method};
use chrono::{DateTime, Utc};
use std::net::{IpAddr, SocketAddr};

/// Transport-level facts about a request, available before the body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// HTTP method.
    pub method: Method,
    /// Raw `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Raw `Origin` header, if any.
    pub origin: Option<String>,
    /// Raw `Authorization` header, if any.
    pub authorization: Option<String>,
    /// Declared `Content-Length`, if any and parseable.
    pub declared_length: Option<u64>,
    /// Peer address the request came from.
    pub source: IpAddr,
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

impl RequestHead {
    /// Capture the head of an incoming request.
    pub fn from_parts(method: &Method, headers: &HeaderMap, peer: SocketAddr) -> Self {
        Self {
            method: method.clone(),
            content_type: header_str(headers, header::CONTENT_TYPE),
            origin: header_str(headers, header::ORIGIN),
            authorization: header_str(headers, header::AUTHORIZATION),
            declared_length: header_str(headers, header::CONTENT_LENGTH)
                .and_then(|v| v.parse().ok()),
            source: peer.ip(),
        }
    }
}

/// A request with its body read, still unvalidated.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    /// Transport facts.
    pub head: RequestHead,
    /// Body bytes as received.
    pub raw_body: Vec<u8>,
}

/// What the sender asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A bank notification to process.
    Message,
    /// Connectivity check from the companion app.
    Ping,
}

/// Validated payload fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Notification text.
    pub content: String,
    /// Android package that produced the notification, if reported.
    pub package: Option<String>,
    /// Message or ping.
    pub kind: NotificationKind,
}

/// A notification that passed every gate. Handed to each handler by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNotification {
    /// Notification text, unwrapped and sanitized.
    pub content: String,
    /// Android package that produced the notification, if reported.
    pub package: Option<String>,
    /// Message or ping.
    pub kind: NotificationKind,
    /// Sender address.
    pub source: IpAddr,
    /// When the server accepted it.
    pub received_at: DateTime<Utc>,
}

impl ParsedNotification {
    /// Stamp a validated payload with its origin and arrival time.
    pub fn new(payload: NotificationPayload, source: IpAddr, received_at: DateTime<Utc>) -> Self {
        Self {
            content: payload.content,
            package: payload.package,
            kind: payload.kind,
            source,
            received_at,
        }
    }
}
