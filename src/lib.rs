//! Live Audio - real-time duplex voice streaming for conversational models
//!
//! This library provides the audio core of a live voice interface:
//! - Capture: microphone to fixed-size PCM blocks for the session
//! - Playback: gap-free scheduling of model speech with barge-in support
//! - Transport: the Live API WebSocket session
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   EncodedBlob    ┌─────────────────┐
//! │ CaptureChain ├─────────────────►│                 │
//! └──────▲───────┘                  │    Transport    │
//!        │ input bus                │  (LiveSession)  │
//! ┌──────┴───────┐                  │                 │
//! │ AudioSession │                  └────────┬────────┘
//! └──────┬───────┘                           │ TransportEvent
//!        │ output bus               ┌────────▼────────┐
//! ┌──────▼───────┐  PlaybackSource  │ VoicePipeline   │
//! │    Mixer     │◄─────────────────┤ + Scheduler     │
//! └──────────────┘                  └─────────────────┘
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod status;
pub mod transport;

pub use audio::{AudioBus, AudioChunk, AudioClock, AudioSession, BusLevel, EncodedBlob};
pub use capture::{CaptureChain, CaptureStatus, CpalMicrophone, Microphone};
pub use config::{AudioConfig, Config, SessionConfig};
pub use error::{Error, Result};
pub use pipeline::{PlaybackFormat, VoicePipeline, handle_event};
pub use playback::{Mixer, OutputDevice, PlaybackScheduler, ScheduledSource};
pub use status::{Status, StatusReporter};
pub use transport::{Connector, LiveConnector, LiveSession, Transport, TransportEvent};
