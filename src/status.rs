//! User-facing status surface
//!
//! Every component reports here instead of failing the pipeline. Consumers
//! subscribe to a watch channel and render the latest [`Status`].

use std::sync::Arc;

use tokio::sync::watch;

/// Latest status line and error, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub error: Option<String>,

    /// Whether the remote session is currently open
    pub connected: bool,
}

/// Cloneable handle that publishes status updates
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: Arc<watch::Sender<Status>>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }

    /// Replace the status line
    pub fn update(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(status = %message, "status");
        self.tx.send_modify(|status| status.message = message);
    }

    /// Record an error for display
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(error = %message, "status error");
        self.tx.send_modify(|status| status.error = Some(message));
    }

    /// Record the session opening or closing along with a status line
    pub fn set_connected(&self, connected: bool, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(connected, status = %message, "session status");
        self.tx.send_modify(|status| {
            status.connected = connected;
            status.message = message;
        });
    }

    pub fn clear_error(&self) {
        self.tx.send_if_modified(|status| status.error.take().is_some());
    }
}
