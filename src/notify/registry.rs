//! Notification handlers and their registry.

use super::request::ParsedNotification;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a handler could not take a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler ran and failed.
    #[error("handler failed: {0}")]
    Failed(String),
    /// The handler's queue is full.
    #[error("handler queue full")]
    QueueFull,
    /// The receiving side has gone away.
    #[error("handler disconnected")]
    Disconnected,
}

/// Something that consumes accepted notifications.
///
/// Handlers run on the blocking pool, one notification at a time per
/// request, and must not touch UI state directly.
pub trait NotificationHandler: Send + Sync {
    /// Consume one notification.
    fn handle(&self, notification: ParsedNotification) -> Result<(), HandlerError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(ParsedNotification) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, notification: ParsedNotification) -> Result<(), HandlerError> {
        self(notification)
    }
}

/// Identifies a registered handler in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

type Entry = (HandlerId, Arc<dyn NotificationHandler>);

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers called.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Copy-on-write handler list.
///
/// Dispatch works on a snapshot, so registering during a dispatch never
/// blocks or affects the notification already in flight.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Arc<Vec<Entry>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. The same handler may be registered more than once.
    pub fn register<H>(&self, handler: H) -> HandlerId
    where
        H: NotificationHandler + 'static,
    {
        self.register_arc(Arc::new(handler))
    }

    /// Add a shared handler.
    pub fn register_arc(&self, handler: Arc<dyn NotificationHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push((id, handler));
        *guard = Arc::new(next);
        debug!(handler = %id, "Notification handler registered");
        id
    }

    /// Current handler list.
    pub fn snapshot(&self) -> Arc<Vec<Entry>> {
        Arc::clone(&self.handlers.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Remove every handler.
    pub fn clear(&self) {
        *self.handlers.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Vec::new());
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.snapshot().iter().any(|(entry, _)| *entry == id)
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `notification` to every handler in registration order.
    ///
    /// Errors and panics are logged and counted; they never stop the
    /// remaining handlers.
    pub fn dispatch(&self, notification: &ParsedNotification) -> DispatchReport {
        let handlers = self.snapshot();
        let mut report = DispatchReport::default();

        for (id, handler) in handlers.iter() {
            report.invoked += 1;
            let owned = notification.clone();
            match catch_unwind(AssertUnwindSafe(|| handler.handle(owned))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(handler = %id, source = %notification.source, error = %e, "Notification handler failed");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(handler = %id, source = %notification.source, "Notification handler panicked");
                }
            }
        }
        report
    }
}
