//! Audio session
//!
//! Owns everything the two chains share: the input and output buses and the
//! output context (mixer plus its clock). Build one per process and hand it to
//! both chains by reference.

use std::sync::Arc;

use crate::Result;
use crate::config::AudioConfig;
use crate::playback::{Mixer, PlaybackScheduler, SourceSink};

use super::{AudioBus, AudioClock, FrameClock};

pub struct AudioSession {
    config: AudioConfig,
    input_bus: Arc<AudioBus>,
    output_bus: Arc<AudioBus>,
    mixer: Arc<Mixer>,
    scheduler: Arc<PlaybackScheduler>,
}

impl AudioSession {
    /// Create the buses and output context
    ///
    /// # Errors
    ///
    /// Returns error if the audio configuration is invalid
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;

        let input_bus = Arc::new(AudioBus::new("input"));
        let output_bus = Arc::new(AudioBus::new("output"));
        let clock = Arc::new(FrameClock::new(config.playback_sample_rate));
        let mixer = Arc::new(Mixer::new(Arc::clone(&clock), Arc::clone(&output_bus)));
        let scheduler = Arc::new(PlaybackScheduler::new(
            clock,
            Arc::clone(&mixer) as Arc<dyn SourceSink>,
            config.max_active_sources,
        ));

        tracing::debug!(
            capture_rate = config.capture_sample_rate,
            playback_rate = config.playback_sample_rate,
            block_size = config.block_size,
            "audio session created"
        );

        Ok(Self {
            config,
            input_bus,
            output_bus,
            mixer,
            scheduler,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Pre-capture tap fed by the raw microphone signal
    #[must_use]
    pub fn input_bus(&self) -> Arc<AudioBus> {
        Arc::clone(&self.input_bus)
    }

    /// Post-playback tap applied to the mixed speaker output
    #[must_use]
    pub fn output_bus(&self) -> Arc<AudioBus> {
        Arc::clone(&self.output_bus)
    }

    /// Output context renderer; hand this to an output device
    #[must_use]
    pub fn mixer(&self) -> Arc<Mixer> {
        Arc::clone(&self.mixer)
    }

    /// The output hardware clock
    #[must_use]
    pub fn clock(&self) -> Arc<dyn AudioClock> {
        self.mixer.clock()
    }

    /// The one scheduler feeding this session's mixer
    ///
    /// Source ids are only unique per scheduler, so every caller shares it.
    #[must_use]
    pub fn scheduler(&self) -> Arc<PlaybackScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Silence all output; buses stay valid for existing readers
    pub fn teardown(&self) {
        self.scheduler.reset();
        self.mixer.stop_all();
        tracing::debug!("audio session torn down");
    }
}
