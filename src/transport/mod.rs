//! Session transport
//!
//! The pipeline talks to the remote model through [`Transport`] for outbound
//! audio and receives [`TransportEvent`]s, in arrival order, on a bounded
//! channel. A [`Connector`] opens fresh sessions, which is how the pipeline
//! re-establishes one on reset. Nothing here retries on its own.

pub mod live;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::audio::EncodedBlob;

pub use live::{LiveConnector, LiveSession};

/// Event delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session established
    Opened,
    /// One encoded chunk of model speech, in playback order
    Audio(EncodedBlob),
    /// The user barged in; queued speech must be discarded
    Interrupted,
    /// The model finished its turn
    TurnComplete,
    /// Session closed by either side
    Closed { reason: String },
    /// Transport-level error
    Error { message: String },
}

/// Outbound half of a duplex session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded audio chunk
    ///
    /// # Errors
    ///
    /// Returns error if the session is no longer accepting input
    async fn send(&self, blob: EncodedBlob) -> Result<()>;

    /// Close the session
    ///
    /// # Errors
    ///
    /// Returns error if the close could not be delivered
    async fn close(&self) -> Result<()>;
}

/// Opens sessions that report into `events`
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<Arc<dyn Transport>>;
}
