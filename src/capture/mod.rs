//! Capture chain
//!
//! Turns the live microphone signal into fixed-size encoded blocks and queues
//! them for the session. The per-block work happens on the audio thread and
//! never waits: blocks go into a bounded queue with `try_send`, and a full
//! queue drops the block.

mod framer;
mod microphone;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::audio::{AudioBus, AudioSession, EncodedBlob, encode_with_rate};
use crate::status::StatusReporter;
use crate::Result;

pub use framer::{BlockFramer, downmix_into};
pub use microphone::{CpalMicrophone, InputFormat, Microphone, SampleCallback};

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Not capturing
    Idle,
    /// Waiting on the microphone
    Requesting,
    /// Forwarding blocks
    Capturing,
    /// Acquisition failed; passes straight back to `Idle`
    Error,
}

/// Microphone-to-session capture chain
pub struct CaptureChain {
    microphone: Box<dyn Microphone>,
    status: CaptureStatus,
    capturing: Arc<AtomicBool>,
    input_bus: Arc<AudioBus>,
    capture_rate: u32,
    block_size: usize,
    outbound: mpsc::Sender<EncodedBlob>,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    reporter: StatusReporter,
}

impl CaptureChain {
    /// Create an idle chain that will queue blocks on `outbound`
    #[must_use]
    pub fn new(
        session: &AudioSession,
        microphone: Box<dyn Microphone>,
        outbound: mpsc::Sender<EncodedBlob>,
        reporter: StatusReporter,
    ) -> Self {
        let config = session.config();
        Self {
            microphone,
            status: CaptureStatus::Idle,
            capturing: Arc::new(AtomicBool::new(false)),
            input_bus: session.input_bus(),
            capture_rate: config.capture_sample_rate,
            block_size: config.block_size,
            outbound,
            sent: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            reporter,
        }
    }

    /// Acquire the microphone and start forwarding blocks
    ///
    /// Does nothing if already capturing.
    ///
    /// # Errors
    ///
    /// Returns `DeviceAccess` if the microphone is missing or denied; the chain
    /// is back in `Idle` and the error has been reported
    pub fn start(&mut self) -> Result<()> {
        if self.status == CaptureStatus::Capturing {
            return Ok(());
        }

        self.status = CaptureStatus::Requesting;
        self.reporter.update("Requesting microphone access...");

        match self.acquire() {
            Ok(()) => {
                self.capturing.store(true, Ordering::Release);
                self.status = CaptureStatus::Capturing;
                self.reporter.update("Recording... Capturing PCM chunks.");
                tracing::info!(
                    rate = self.capture_rate,
                    block_size = self.block_size,
                    "capture started"
                );
                Ok(())
            }
            Err(e) => {
                self.status = CaptureStatus::Error;
                self.microphone.close();
                tracing::warn!(error = %e, "capture failed to start");
                self.reporter.error(format!("Error: {e}"));
                self.status = CaptureStatus::Idle;
                Err(e)
            }
        }
    }

    /// Stop forwarding and release the microphone
    ///
    /// Safe to call when idle or never started.
    pub fn stop(&mut self) {
        if self.status == CaptureStatus::Idle {
            return;
        }

        self.capturing.store(false, Ordering::Release);
        self.microphone.close();
        self.status = CaptureStatus::Idle;
        self.reporter.update("Recording stopped.");
        tracing::info!(
            sent = self.sent_blocks(),
            dropped = self.dropped_blocks(),
            "capture stopped"
        );
    }

    #[must_use]
    pub const fn status(&self) -> CaptureStatus {
        self.status
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Blocks queued for the session since creation
    #[must_use]
    pub fn sent_blocks(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Blocks dropped because the outbound queue was full or closed
    #[must_use]
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn acquire(&mut self) -> Result<()> {
        let format = self.microphone.open()?;
        let framer = BlockFramer::new(format.sample_rate, self.capture_rate, self.block_size)?;
        let on_samples = self.block_callback(framer, usize::from(format.channels));
        self.microphone.start(on_samples)
    }

    /// Build the audio-thread callback: downmix, tap, frame, encode, queue
    fn block_callback(&self, mut framer: BlockFramer, channels: usize) -> SampleCallback {
        let capturing = Arc::clone(&self.capturing);
        let input_bus = Arc::clone(&self.input_bus);
        let outbound = self.outbound.clone();
        let sent = Arc::clone(&self.sent);
        let dropped = Arc::clone(&self.dropped);
        let capture_rate = self.capture_rate;
        let mut mono = Vec::new();

        Box::new(move |data: &[f32]| {
            downmix_into(data, channels, &mut mono);
            input_bus.observe(&mono);

            framer.push(&mono, |block| {
                if !capturing.load(Ordering::Acquire) {
                    return;
                }
                match outbound.try_send(encode_with_rate(block, capture_rate)) {
                    Ok(()) => {
                        sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        })
    }
}

impl Drop for CaptureChain {
    fn drop(&mut self) {
        self.capturing.store(false, Ordering::Release);
        self.microphone.close();
    }
}

