//! Voice pipeline
//!
//! Connects the capture chain and the playback scheduler to a transport.
//! Outbound blocks flow through a bounded queue to a sender task; inbound
//! transport events are drained by a single consumer task, so chunks and
//! interruptions reach the scheduler strictly in arrival order.
//!
//! The transport can be swapped on [`VoicePipeline::reset`]; capture keeps
//! running and its blocks go to whichever session is current.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::Result;
use crate::audio::{AudioSession, EncodedBlob, decode, render_to_audio_buffer};
use crate::capture::{CaptureChain, CaptureStatus, Microphone};
use crate::playback::PlaybackScheduler;
use crate::status::StatusReporter;
use crate::transport::{Connector, Transport, TransportEvent};

/// Format inbound audio is rendered at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Running duplex pipeline
pub struct VoicePipeline {
    capture: CaptureChain,
    scheduler: Arc<PlaybackScheduler>,
    reporter: StatusReporter,
    format: PlaybackFormat,
    event_queue_depth: usize,
    transport: watch::Sender<Arc<dyn Transport>>,
    sender: JoinHandle<()>,
    consumer: Option<JoinHandle<()>>,
}

impl VoicePipeline {
    /// Wire a session, microphone and transport together
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        session: &AudioSession,
        microphone: Box<dyn Microphone>,
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
        reporter: StatusReporter,
    ) -> Self {
        let config = session.config();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.send_queue_depth);

        let capture = CaptureChain::new(session, microphone, outbound_tx, reporter.clone());
        let scheduler = session.scheduler();
        let format = PlaybackFormat {
            sample_rate: config.playback_sample_rate,
            channels: config.output_channels,
        };

        let (transport, current) = watch::channel(transport);
        let sender = tokio::spawn(forward_outbound(outbound_rx, current));
        let consumer = tokio::spawn(consume_events(
            events,
            Arc::clone(&scheduler),
            reporter.clone(),
            format,
        ));

        Self {
            capture,
            scheduler,
            reporter,
            format,
            event_queue_depth: config.event_queue_depth,
            transport,
            sender,
            consumer: Some(consumer),
        }
    }

    /// Start capturing and streaming microphone audio
    ///
    /// # Errors
    ///
    /// Returns `DeviceAccess` if the microphone cannot be acquired
    pub fn start_capture(&mut self) -> Result<()> {
        self.capture.start()
    }

    /// Stop capturing; idempotent
    pub fn stop_capture(&mut self) {
        self.capture.stop();
    }

    #[must_use]
    pub const fn capture_status(&self) -> CaptureStatus {
        self.capture.status()
    }

    #[must_use]
    pub const fn capture(&self) -> &CaptureChain {
        &self.capture
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<PlaybackScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// The session outbound audio currently goes to
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.borrow().clone()
    }

    /// Tear down the current session and open a new one
    ///
    /// Events still queued from the old session are discarded. The new
    /// session's events only reach playback after it has been flushed.
    ///
    /// # Errors
    ///
    /// Returns error if the new session cannot be opened; playback is flushed
    /// and no session is attached until the next successful reset
    pub async fn reset(&mut self, connector: &dyn Connector) -> Result<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
            let _ = consumer.await;
        }

        if let Err(e) = self.transport().close().await {
            tracing::debug!(error = %e, "previous session already closed");
        }

        let (events_tx, events_rx) = mpsc::channel(self.event_queue_depth);
        let connected = connector.connect(events_tx).await;
        self.scheduler.reset();

        let transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(error = %e, "session reset failed");
                self.reporter.error(format!("Error: {e}"));
                return Err(e);
            }
        };

        self.transport.send_replace(transport);
        self.consumer = Some(tokio::spawn(consume_events(
            events_rx,
            Arc::clone(&self.scheduler),
            self.reporter.clone(),
            self.format,
        )));

        self.reporter.update("Session cleared.");
        tracing::info!("session reset");
        Ok(())
    }

    /// Stop capture, flush playback and stop the background tasks
    pub fn shutdown(mut self) {
        self.capture.stop();
        self.scheduler.reset();
        self.sender.abort();
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
        tracing::debug!("pipeline shut down");
    }
}

/// Apply one transport event to playback and the status surface
///
/// Malformed chunks and a full active set are reported and dropped; nothing
/// here stops the pipeline.
pub fn handle_event(
    event: TransportEvent,
    scheduler: &PlaybackScheduler,
    reporter: &StatusReporter,
    format: PlaybackFormat,
) {
    match event {
        TransportEvent::Audio(blob) => handle_audio(&blob, scheduler, reporter, format),
        TransportEvent::Interrupted => scheduler.on_interrupt(),
        TransportEvent::TurnComplete => tracing::debug!("model turn complete"),
        TransportEvent::Opened => reporter.set_connected(true, "Opened"),
        TransportEvent::Closed { reason } => reporter.set_connected(false, format!("Close:{reason}")),
        TransportEvent::Error { message } => {
            tracing::warn!(error = %message, "transport error");
            reporter.error(message);
        }
    }
}

fn handle_audio(
    blob: &EncodedBlob,
    scheduler: &PlaybackScheduler,
    reporter: &StatusReporter,
    format: PlaybackFormat,
) {
    let raw = match decode(blob) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, mime = %blob.mime_type, "dropping inbound chunk");
            reporter.error(e.to_string());
            return;
        }
    };

    if let Some(rate) = blob.sample_rate().filter(|&r| r != format.sample_rate) {
        tracing::debug!(
            declared = rate,
            playback = format.sample_rate,
            "inbound chunk declares a different rate"
        );
    }

    let chunk = render_to_audio_buffer(&raw, format.sample_rate, format.channels);
    if let Err(e) = scheduler.on_chunk_received(chunk) {
        tracing::warn!(error = %e, "dropping inbound chunk");
        reporter.error(e.to_string());
    }
}

/// Drain transport events in arrival order
async fn consume_events(
    mut events: mpsc::Receiver<TransportEvent>,
    scheduler: Arc<PlaybackScheduler>,
    reporter: StatusReporter,
    format: PlaybackFormat,
) {
    while let Some(event) = events.recv().await {
        handle_event(event, &scheduler, &reporter, format);
    }
    tracing::debug!("transport event stream ended");
}

/// Hand queued blocks to the current transport one at a time
async fn forward_outbound(
    mut blocks: mpsc::Receiver<EncodedBlob>,
    current: watch::Receiver<Arc<dyn Transport>>,
) {
    while let Some(blob) = blocks.recv().await {
        let transport = current.borrow().clone();
        if let Err(e) = transport.send(blob).await {
            tracing::debug!(error = %e, "outbound chunk not delivered");
        }
    }
}
