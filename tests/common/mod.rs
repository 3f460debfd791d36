//! Shared test utilities
//!
//! Hardware-free stand-ins for the microphone, the output context and the
//! remote session.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use live_audio::audio::AudioChunk;
use live_audio::capture::{InputFormat, Microphone, SampleCallback};
use live_audio::playback::{PlaybackSource, SourceId, SourceSink};
use live_audio::{Connector, EncodedBlob, Error, Result, Transport, TransportEvent};

/// Generate sine wave audio samples
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sine(frequency: f32, sample_rate: u32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Mono chunk lasting exactly `seconds` at `sample_rate`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn chunk_of(seconds: f64, sample_rate: u32) -> AudioChunk {
    let frames = (seconds * f64::from(sample_rate)).round() as usize;
    AudioChunk::new(vec![0.1; frames], sample_rate, 1)
}

/// Output context that records what it was asked to play
#[derive(Default)]
pub struct RecordingSink {
    scheduled: Mutex<Vec<PlaybackSource>>,
    stopped: Mutex<Vec<SourceId>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// (id, start time) of every source ever scheduled
    pub fn starts(&self) -> Vec<(SourceId, f64)> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|s| (s.id(), s.start_time()))
            .collect()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.stopped.lock().unwrap().clone()
    }

    /// Play `id` to its natural end, firing its completion callback
    pub fn finish(&self, id: SourceId) {
        let on_ended = self
            .scheduled
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id() == id)
            .and_then(PlaybackSource::take_on_ended);

        if let Some(on_ended) = on_ended {
            on_ended();
        }
    }

    /// Fire every completion that is still pending, as a late output context would
    pub fn finish_all(&self) {
        let pending: Vec<_> = self
            .scheduled
            .lock()
            .unwrap()
            .iter_mut()
            .filter_map(PlaybackSource::take_on_ended)
            .collect();

        for on_ended in pending {
            on_ended();
        }
    }
}

impl SourceSink for RecordingSink {
    fn schedule(&self, source: PlaybackSource) {
        self.scheduled.lock().unwrap().push(source);
    }

    fn stop(&self, id: SourceId) {
        self.stopped.lock().unwrap().push(id);
    }
}

type SharedCallback = Arc<Mutex<Option<SampleCallback>>>;

/// Microphone driven by the test instead of hardware
pub struct ScriptedMicrophone {
    format: InputFormat,
    deny: bool,
    callback: SharedCallback,
    opens: Arc<Mutex<u32>>,
}

/// Test-side handle to a [`ScriptedMicrophone`]
#[derive(Clone)]
pub struct MicHandle {
    callback: SharedCallback,
    opens: Arc<Mutex<u32>>,
}

impl ScriptedMicrophone {
    pub fn new(sample_rate: u32, channels: u16) -> (Self, MicHandle) {
        let callback = SharedCallback::default();
        let opens = Arc::new(Mutex::new(0));
        let handle = MicHandle {
            callback: Arc::clone(&callback),
            opens: Arc::clone(&opens),
        };
        let mic = Self {
            format: InputFormat {
                sample_rate,
                channels,
            },
            deny: false,
            callback,
            opens,
        };
        (mic, handle)
    }

    /// Microphone whose permission request is always refused
    pub fn denied() -> (Self, MicHandle) {
        let (mut mic, handle) = Self::new(16000, 1);
        mic.deny = true;
        (mic, handle)
    }
}

impl Microphone for ScriptedMicrophone {
    fn open(&mut self) -> Result<InputFormat> {
        *self.opens.lock().unwrap() += 1;
        if self.deny {
            return Err(Error::DeviceAccess("permission denied".to_string()));
        }
        Ok(self.format)
    }

    fn start(&mut self, on_samples: SampleCallback) -> Result<()> {
        *self.callback.lock().unwrap() = Some(on_samples);
        Ok(())
    }

    fn close(&mut self) {
        self.callback.lock().unwrap().take();
    }
}

impl MicHandle {
    /// Deliver interleaved samples as the audio thread would; false if closed
    pub fn feed(&self, samples: &[f32]) -> bool {
        match self.callback.lock().unwrap().as_mut() {
            Some(callback) => {
                callback(samples);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    pub fn opens(&self) -> u32 {
        *self.opens.lock().unwrap()
    }
}

/// Transport that hands outbound blobs to the test
pub struct ChannelTransport {
    sent: mpsc::UnboundedSender<EncodedBlob>,
    closed: Mutex<bool>,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EncodedBlob>) {
        let (sent, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sent,
            closed: Mutex::new(false),
        });
        (transport, rx)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, blob: EncodedBlob) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("closed".to_string()));
        }
        self.sent
            .send(blob)
            .map_err(|_| Error::Transport("receiver gone".to_string()))
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// One session opened by a [`ScriptedConnector`]
pub struct ScriptedSession {
    pub transport: Arc<ChannelTransport>,
    pub sent: mpsc::UnboundedReceiver<EncodedBlob>,
    pub events: mpsc::Sender<TransportEvent>,
}

/// Connector that opens in-memory sessions, or refuses to
#[derive(Default)]
pub struct ScriptedConnector {
    refuse: bool,
    opened: Mutex<VecDeque<ScriptedSession>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Oldest session not yet taken by the test
    pub fn take_session(&self) -> Option<ScriptedSession> {
        self.opened.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, events: mpsc::Sender<TransportEvent>) -> Result<Arc<dyn Transport>> {
        if self.refuse {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (transport, sent) = ChannelTransport::new();
        self.opened.lock().unwrap().push_back(ScriptedSession {
            transport: Arc::clone(&transport),
            sent,
            events,
        });
        let transport: Arc<dyn Transport> = transport;
        Ok(transport)
    }
}
