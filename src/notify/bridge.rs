//! Hand-off from listener threads to the UI thread.
//!
//! The UI toolkit is not thread-safe; the listener never touches it. A
//! [`UiSender`] registered as a handler queues notifications and the UI
//! thread drains its [`UiReceiver`] on its own schedule.

use super::registry::{HandlerError, NotificationHandler};
use super::request::ParsedNotification;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Create a bounded notification queue for the UI thread.
pub fn ui_channel(capacity: usize) -> (UiSender, UiReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UiSender { tx }, UiReceiver { rx })
}

/// Listener side of the UI queue. Never blocks.
#[derive(Debug, Clone)]
pub struct UiSender {
    tx: mpsc::Sender<ParsedNotification>,
}

impl NotificationHandler for UiSender {
    fn handle(&self, notification: ParsedNotification) -> Result<(), HandlerError> {
        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => HandlerError::QueueFull,
            TrySendError::Closed(_) => HandlerError::Disconnected,
        })
    }
}

/// UI side of the queue.
#[derive(Debug)]
pub struct UiReceiver {
    rx: mpsc::Receiver<ParsedNotification>,
}

impl UiReceiver {
    /// Next queued notification, if any.
    pub fn try_recv(&mut self) -> Option<ParsedNotification> {
        match self.rx.try_recv() {
            Ok(notification) => Some(notification),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<ParsedNotification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Wait for the next notification. Returns `None` once every sender is
    /// gone.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ParsedNotification> {
        self.rx.blocking_recv()
    }
}
