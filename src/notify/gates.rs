//! Request admission for the notification endpoint.
//!
//! Gates run in a fixed order and the first failure wins:
//! method, content type, source (origin and bearer secret), body size,
//! payload, rate limit. A rejected request never reaches a handler.

use super::rate_limit::{RateDecision, RateLimiter};
use super::request::{NotificationKind, NotificationPayload, NotificationRequest, RequestHead};
use crate::clock::Clock;
use crate::config::NotificationConfig;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Content type assumed when the sender omits the header.
const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Reason a request was refused.
///
/// Only the canonical status text reaches the client; detail stays in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Method other than POST.
    #[error("method not allowed")]
    MethodNotAllowed,
    /// Content type not in the accepted list.
    #[error("unsupported media type")]
    UnsupportedMediaType,
    /// Shared secret configured but no bearer token presented.
    #[error("unauthorized")]
    Unauthorized,
    /// Origin not allowed or bearer token mismatch.
    #[error("forbidden")]
    Forbidden,
    /// Body over `max_body_bytes`.
    #[error("payload too large")]
    PayloadTooLarge,
    /// Body is not a usable notification.
    #[error("bad request")]
    BadRequest,
    /// Source over its rate limit.
    #[error("too many requests")]
    TooManyRequests {
        /// Seconds the sender should wait.
        retry_after_secs: u64,
    },
    /// No route for the path.
    #[error("not found")]
    NotFound,
}

impl Rejection {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::BadRequest => StatusCode::BAD_REQUEST,
            Rejection::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Canonical reason phrase sent to the client.
    pub fn reason(&self) -> &'static str {
        self.status().canonical_reason().unwrap_or("Error")
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(json!({ "status": "error", "message": self.reason() }));
        let mut response = (self.status(), body).into_response();
        match self {
            Rejection::MethodNotAllowed => {
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST"));
            }
            Rejection::TooManyRequests { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }
        response
    }
}

/// The gates, configured once per server.
pub struct RequestPipeline {
    accepted_types: Vec<String>,
    allowed_origins: Vec<String>,
    shared_secret: Option<String>,
    max_body_bytes: usize,
    package_allowlist: HashSet<String>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("accepted_types", &self.accepted_types)
            .field("allowed_origins", &self.allowed_origins)
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "<redacted>"))
            .field("max_body_bytes", &self.max_body_bytes)
            .field("package_allowlist", &self.package_allowlist.len())
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Build the gates from config.
    pub fn new(config: &NotificationConfig, limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            accepted_types: config
                .accepted_content_types
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .collect(),
            allowed_origins: config
                .allowed_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .collect(),
            shared_secret: config.shared_secret.clone(),
            max_body_bytes: config.max_body_bytes,
            package_allowlist: config.package_allowlist.iter().cloned().collect(),
            limiter,
            clock,
        }
    }

    /// Body size limit in bytes.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Gates 1 to 4 on the request head: method, content type, source and
    /// declared length.
    pub fn admit_head(&self, head: &RequestHead) -> Result<(), Rejection> {
        // 1. Method
        if head.method != Method::POST {
            return Err(Rejection::MethodNotAllowed);
        }

        // 2. Content type, parameters ignored
        let media = head
            .content_type
            .as_deref()
            .map(media_type)
            .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());
        if !self.accepted_types.iter().any(|t| *t == media) {
            return Err(Rejection::UnsupportedMediaType);
        }

        // 3. Source: origin allow-list, then shared secret
        if !self.allowed_origins.is_empty() {
            let origin = head.origin.as_deref().map(|o| o.trim_end_matches('/'));
            match origin {
                Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => {}
                _ => return Err(Rejection::Forbidden),
            }
        }
        if let Some(secret) = &self.shared_secret {
            let token = head
                .authorization
                .as_deref()
                .and_then(bearer_token)
                .ok_or(Rejection::Unauthorized)?;
            if !bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
                return Err(Rejection::Forbidden);
            }
        }

        // 4. Declared length
        if let Some(length) = head.declared_length {
            if length > self.max_body_bytes as u64 {
                return Err(Rejection::PayloadTooLarge);
            }
        }
        Ok(())
    }

    /// Gates 5 and 6 on a request whose body has been read.
    ///
    /// The source is recorded in the rate window before the payload is
    /// parsed, so malformed requests count against the sender too. A
    /// malformed payload is still reported as `400` ahead of `429`.
    pub fn admit_body(&self, request: &NotificationRequest) -> Result<NotificationPayload, Rejection> {
        if request.raw_body.len() > self.max_body_bytes {
            return Err(Rejection::PayloadTooLarge);
        }

        let decision = self.limiter.check(request.head.source, self.clock.now_utc());

        // 5. Payload
        let payload = parse_payload(&request.raw_body)?;

        // 6. Rate limit
        if let RateDecision::Limited { retry_after_secs } = decision {
            return Err(Rejection::TooManyRequests { retry_after_secs });
        }
        Ok(payload)
    }

    /// Whether a payload from `package` should be dispatched.
    ///
    /// Payloads without a package, and every payload when the allow-list is
    /// empty, pass.
    pub fn package_allowed(&self, package: Option<&str>) -> bool {
        match package {
            Some(package) if !self.package_allowlist.is_empty() => {
                self.package_allowlist.contains(package)
            }
            _ => true,
        }
    }
}

/// Lowercased media type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Decode a notification body.
///
/// The body must be a UTF-8 JSON object with a non-empty string `content`.
/// A `content` that is itself a JSON object is unwrapped to its inner
/// `content`; plain text has `<` and `>` removed.
pub fn parse_payload(body: &[u8]) -> Result<NotificationPayload, Rejection> {
    let text = std::str::from_utf8(body).map_err(|_| {
        debug!("Notification body is not UTF-8");
        Rejection::BadRequest
    })?;
    let value: Value = serde_json::from_str(text).map_err(|e| {
        debug!(error = %e, "Notification body is not JSON");
        Rejection::BadRequest
    })?;
    let object = value.as_object().ok_or(Rejection::BadRequest)?;

    let mut package = optional_string(object.get("package"))?;
    let raw_content = object
        .get("content")
        .and_then(Value::as_str)
        .ok_or(Rejection::BadRequest)?;

    let content = match serde_json::from_str::<Value>(raw_content) {
        Ok(Value::Object(inner)) => {
            if package.is_none() {
                package = optional_string(inner.get("package"))?;
            }
            match inner.get("content").and_then(Value::as_str) {
                Some(inner_content) => inner_content.to_string(),
                None => raw_content.to_string(),
            }
        }
        Ok(_) => raw_content.to_string(),
        Err(_) => raw_content.replace(['<', '>'], ""),
    };

    if content.trim().is_empty() {
        return Err(Rejection::BadRequest);
    }

    let kind = if content == "Ping" {
        NotificationKind::Ping
    } else {
        NotificationKind::Message
    };
    Ok(NotificationPayload {
        content,
        package,
        kind,
    })
}

fn optional_string(value: Option<&Value>) -> Result<Option<String>, Rejection> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(Rejection::BadRequest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::config::RateLimitConfig;
    use std::net::IpAddr;

    fn pipeline_with(config: NotificationConfig) -> RequestPipeline {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let clock: Arc<dyn Clock> = Arc::new(MockClock::from_rfc3339("2026-03-01T08:00:00Z"));
        RequestPipeline::new(&config, limiter, clock)
    }

    fn pipeline() -> RequestPipeline {
        pipeline_with(NotificationConfig::default())
    }

    fn head() -> RequestHead {
        RequestHead {
            method: Method::POST,
            content_type: Some("application/json".to_string()),
            origin: None,
            authorization: None,
            declared_length: Some(40),
            source: "192.168.1.20".parse::<IpAddr>().unwrap(),
        }
    }

    fn request(body: &str) -> NotificationRequest {
        NotificationRequest {
            head: head(),
            raw_body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_post_json_passes_head_gates() {
        assert_eq!(pipeline().admit_head(&head()), Ok(()));
    }

    #[test]
    fn test_method_gate() {
        let mut h = head();
        h.method = Method::GET;
        assert_eq!(pipeline().admit_head(&h), Err(Rejection::MethodNotAllowed));
    }

    #[test]
    fn test_content_type_gate() {
        let p = pipeline();
        let mut h = head();
        h.content_type = Some("Application/JSON; charset=UTF-8".to_string());
        assert_eq!(p.admit_head(&h), Ok(()));

        h.content_type = Some("text/plain".to_string());
        assert_eq!(p.admit_head(&h), Err(Rejection::UnsupportedMediaType));

        h.content_type = None;
        assert_eq!(p.admit_head(&h), Ok(()));
    }

    #[test]
    fn test_method_checked_before_content_type() {
        let mut h = head();
        h.method = Method::PUT;
        h.content_type = Some("text/plain".to_string());
        assert_eq!(pipeline().admit_head(&h), Err(Rejection::MethodNotAllowed));
    }

    #[test]
    fn test_origin_allow_list() {
        let p = pipeline_with(NotificationConfig {
            allowed_origins: vec!["http://192.168.1.20:8080/".to_string()],
            ..Default::default()
        });
        let mut h = head();
        assert_eq!(p.admit_head(&h), Err(Rejection::Forbidden));

        h.origin = Some("http://evil.example".to_string());
        assert_eq!(p.admit_head(&h), Err(Rejection::Forbidden));

        h.origin = Some("http://192.168.1.20:8080".to_string());
        assert_eq!(p.admit_head(&h), Ok(()));
    }

    #[test]
    fn test_shared_secret() {
        let p = pipeline_with(NotificationConfig {
            shared_secret: Some("s3cret".to_string()),
            ..Default::default()
        });
        let mut h = head();
        assert_eq!(p.admit_head(&h), Err(Rejection::Unauthorized));

        h.authorization = Some("Basic czNjcmV0".to_string());
        assert_eq!(p.admit_head(&h), Err(Rejection::Unauthorized));

        h.authorization = Some("Bearer wrong".to_string());
        assert_eq!(p.admit_head(&h), Err(Rejection::Forbidden));

        h.authorization = Some("bearer s3cret".to_string());
        assert_eq!(p.admit_head(&h), Ok(()));
    }

    #[test]
    fn test_declared_length_gate() {
        let mut h = head();
        h.declared_length = Some(10 * 1024 + 1);
        assert_eq!(pipeline().admit_head(&h), Err(Rejection::PayloadTooLarge));
        h.declared_length = Some(10 * 1024);
        assert_eq!(pipeline().admit_head(&h), Ok(()));
    }

    #[test]
    fn test_oversized_body_rejected() {
        let body = format!(r#"{{"content":"{}"}}"#, "x".repeat(10 * 1024));
        assert_eq!(pipeline().admit_body(&request(&body)), Err(Rejection::PayloadTooLarge));
    }

    #[test]
    fn test_payload_plain_message() {
        let payload = parse_payload(
            r#"{"content":"Nhan tien <b>500.000 VND</b>","package":"com.mbmobile"}"#.as_bytes(),
        )
        .unwrap();
        assert_eq!(payload.content, "Nhan tien b500.000 VND/b");
        assert_eq!(payload.package.as_deref(), Some("com.mbmobile"));
        assert_eq!(payload.kind, NotificationKind::Message);
    }

    #[test]
    fn test_payload_nested_content_unwrapped() {
        let body = json!({
            "content": json!({"content": "CT DI:603709817078 500.000 VND", "package": "com.vietinbank.ipay"}).to_string()
        })
        .to_string();
        let payload = parse_payload(body.as_bytes()).unwrap();
        assert_eq!(payload.content, "CT DI:603709817078 500.000 VND");
        assert_eq!(payload.package.as_deref(), Some("com.vietinbank.ipay"));
    }

    #[test]
    fn test_payload_ping() {
        let payload = parse_payload(br#"{"content":"Ping"}"#).unwrap();
        assert_eq!(payload.kind, NotificationKind::Ping);
        assert_eq!(payload.package, None);
    }

    #[test]
    fn test_payload_rejections() {
        for body in [
            &b"not json"[..],
            b"[1,2,3]",
            br#"{"message":"hi"}"#,
            br#"{"content":""}"#,
            br#"{"content":"   "}"#,
            br#"{"content":"<>"}"#,
            br#"{"content":42}"#,
            br#"{"content":"hi","package":7}"#,
            b"\xff\xfe{}",
        ] {
            assert_eq!(parse_payload(body), Err(Rejection::BadRequest), "{:?}", body);
        }
    }

    #[test]
    fn test_rate_limit_after_payload() {
        let p = pipeline_with(NotificationConfig {
            rate_limit: RateLimitConfig {
                threshold: 2,
                ..Default::default()
            },
            ..Default::default()
        });
        let good = request(r#"{"content":"hello"}"#);
        let bad = request("garbage");

        assert!(p.admit_body(&good).is_ok());
        // Malformed bodies still count toward the window.
        assert_eq!(p.admit_body(&bad), Err(Rejection::BadRequest));
        assert_eq!(p.admit_body(&bad), Err(Rejection::BadRequest));
        assert!(matches!(
            p.admit_body(&good),
            Err(Rejection::TooManyRequests { retry_after_secs: 60 })
        ));
    }

    #[test]
    fn test_package_filter() {
        let p = pipeline();
        assert!(p.package_allowed(Some("com.vietcombank.mobile")));
        assert!(!p.package_allowed(Some("com.facebook.orca")));
        assert!(p.package_allowed(None));

        let open = pipeline_with(NotificationConfig {
            package_allowlist: Vec::new(),
            ..Default::default()
        });
        assert!(open.package_allowed(Some("com.facebook.orca")));
    }

    #[test]
    fn test_rejection_responses() {
        let response = Rejection::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST");

        let response = Rejection::TooManyRequests { retry_after_secs: 17 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "17");

        assert_eq!(Rejection::Forbidden.reason(), "Forbidden");
        assert_eq!(Rejection::PayloadTooLarge.reason(), "Payload Too Large");
    }
}
