//! Embedded HTTP listener for bank notifications relayed by the phone.
//!
//! The listener owns a dedicated multi-thread tokio runtime so the host
//! application can stay synchronous. `start()` binds on the caller's thread
//! and returns once the socket is listening; `stop()` drains in-flight
//! requests up to the configured timeout and releases the port.

use super::gates::{Rejection, RequestPipeline};
use super::rate_limit::RateLimiter;
use super::registry::{HandlerId, HandlerRegistry, NotificationHandler};
use super::request::{NotificationKind, NotificationRequest, ParsedNotification, RequestHead};
use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::DepotGuardError;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace given to abandoned tasks when the runtime is torn down.
const ABANDON_GRACE: Duration = Duration::from_millis(100);

struct AppState {
    pipeline: RequestPipeline,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
}

struct Running {
    runtime: Runtime,
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    serve_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
}

/// The notification listener.
pub struct NotificationServer {
    config: NotificationConfig,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
    registry: Arc<HandlerRegistry>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for NotificationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationServer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("path", &self.config.path)
            .field("local_addr", &self.local_addr())
            .field("handlers", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl NotificationServer {
    /// Create a stopped server.
    pub fn new(config: NotificationConfig, clock: Arc<dyn Clock>) -> Result<Self, DepotGuardError> {
        config.validate()?;
        if config.shared_secret.is_none() {
            warn!("Notification listener has no shared secret; any host on the network can post");
        }
        Ok(Self {
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            registry: Arc::new(HandlerRegistry::new()),
            config,
            clock,
            running: Mutex::new(None),
        })
    }

    /// Bind and start serving. Returns the bound address.
    ///
    /// Calling `start` on a running server is a no-op.
    pub fn start(&self) -> Result<SocketAddr, DepotGuardError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = running.as_ref() {
            debug!(addr = %current.local_addr, "Notification listener already running");
            return Ok(current.local_addr);
        }

        // 1. Bind on the caller's thread so failures surface here
        let requested = format!("{}:{}", self.config.host, self.config.port);
        let std_listener = std::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .map_err(|e| DepotGuardError::bind(requested.clone(), e))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| DepotGuardError::bind(requested.clone(), e))?;
        let local_addr = std_listener
            .local_addr()
            .map_err(|e| DepotGuardError::bind(requested.clone(), e))?;

        // 2. Runtime
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("depotguard-notify")
            .enable_all()
            .build()
            .map_err(|e| DepotGuardError::Runtime(format!("Failed to build runtime: {}", e)))?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(std_listener)
                .map_err(|e| DepotGuardError::bind(requested.clone(), e))?
        };

        // 3. Serve
        let state = Arc::new(AppState {
            pipeline: RequestPipeline::new(
                &self.config,
                Arc::clone(&self.limiter),
                Arc::clone(&self.clock),
            ),
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
        });
        let router = build_router(&self.config.path, state);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve_task = runtime.spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Notification listener failed");
            }
        });

        // 4. Periodic eviction of idle rate-limit entries
        let limiter = Arc::clone(&self.limiter);
        let clock = Arc::clone(&self.clock);
        let period = Duration::from_secs(self.config.rate_limit.window_secs);
        let sweep_task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                limiter.evict_stale(clock.now_utc());
            }
        });

        info!(
            addr = %local_addr,
            path = %self.config.path,
            "Notification listener started"
        );
        *running = Some(Running {
            runtime,
            local_addr,
            shutdown_tx,
            serve_task,
            sweep_task,
        });
        Ok(local_addr)
    }

    /// Stop serving, drain in-flight requests and clear the handler
    /// registry. A no-op when the server is not running.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Running {
            runtime,
            local_addr,
            shutdown_tx,
            serve_task,
            sweep_task,
        }) = running
        else {
            return;
        };

        info!(addr = %local_addr, "Stopping notification listener");
        let _ = shutdown_tx.send(());
        sweep_task.abort();

        // Runtime teardown blocks, which is not allowed on an async thread,
        // so it happens on a plain thread whatever the caller is.
        let drain = self.config.drain_timeout();
        let drained = std::thread::spawn(move || {
            let drained = runtime
                .block_on(async move { tokio::time::timeout(drain, serve_task).await.is_ok() });
            runtime.shutdown_timeout(ABANDON_GRACE);
            drained
        })
        .join()
        .unwrap_or(false);

        if !drained {
            warn!(
                addr = %local_addr,
                timeout_ms = drain.as_millis() as u64,
                "In-flight notification requests abandoned after drain timeout"
            );
        }
        self.registry.clear();
        info!(addr = %local_addr, "Notification listener stopped");
    }

    /// Add a handler. Allowed before or after `start`.
    pub fn register_handler<H>(&self, handler: H) -> HandlerId
    where
        H: NotificationHandler + 'static,
    {
        self.registry.register(handler)
    }

    /// Add a shared handler.
    pub fn register_shared(&self, handler: Arc<dyn NotificationHandler>) -> HandlerId {
        self.registry.register_arc(handler)
    }

    /// Whether handler `id` is still registered. Handlers are dropped by
    /// [`stop`](Self::stop).
    pub fn is_registered(&self, id: HandlerId) -> bool {
        self.registry.contains(id)
    }

    /// Whether the listener is serving.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.local_addr)
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of sources currently tracked by the rate limiter.
    pub fn tracked_sources(&self) -> usize {
        self.limiter.tracked_sources()
    }

    /// Listener configuration.
    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }
}

impl Drop for NotificationServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_router(path: &str, state: Arc<AppState>) -> Router {
    Router::new()
        .route(path, any(receive_notification))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> Response {
    Rejection::NotFound.into_response()
}

async fn receive_notification(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let head = RequestHead::from_parts(&method, &headers, peer);
    match process(&state, head, body).await {
        Ok(response) => response,
        Err(rejection) => {
            warn!(
                source = %peer.ip(),
                reason = %rejection,
                status = rejection.status().as_u16(),
                "Notification request rejected"
            );
            rejection.into_response()
        }
    }
}

async fn process(state: &AppState, head: RequestHead, body: Body) -> Result<Response, Rejection> {
    // 1-4. Method, content type, source, declared length
    state.pipeline.admit_head(&head)?;

    // Body, capped while streaming
    let raw_body = read_body(body, state.pipeline.max_body_bytes()).await?;
    let request = NotificationRequest { head, raw_body };

    // 5-6. Payload, rate limit
    let payload = state.pipeline.admit_body(&request)?;
    let source = request.head.source;

    if !state.pipeline.package_allowed(payload.package.as_deref()) {
        debug!(
            source = %source,
            package = payload.package.as_deref().unwrap_or_default(),
            "Notification filtered by package"
        );
        return Ok(success("filtered"));
    }

    let kind = payload.kind;
    let notification = ParsedNotification::new(payload, source, state.clock.now_utc());
    let registry = Arc::clone(&state.registry);
    match tokio::task::spawn_blocking(move || registry.dispatch(&notification)).await {
        Ok(report) => debug!(
            source = %source,
            invoked = report.invoked,
            failed = report.failed,
            "Notification dispatched"
        ),
        Err(e) => error!(source = %source, error = %e, "Notification dispatch task failed"),
    }

    Ok(success(match kind {
        NotificationKind::Ping => "pong",
        NotificationKind::Message => "received",
    }))
}

async fn read_body(body: Body, limit: usize) -> Result<Vec<u8>, Rejection> {
    let mut stream = std::pin::pin!(body.into_data_stream());
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            debug!(error = %e, "Failed to read notification body");
            Rejection::BadRequest
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(Rejection::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn success(message: &'static str) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "message": message })),
    )
        .into_response()
}
