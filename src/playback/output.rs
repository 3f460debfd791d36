//! Speaker output stream driving the mixer

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

use super::Mixer;

/// Default output device rendering a [`Mixer`]
///
/// The stream runs for as long as this value is alive.
pub struct OutputDevice {
    config: StreamConfig,
    _stream: Stream,
}

impl OutputDevice {
    /// Open the default output device at the mixer's sample rate and start it
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the rate or the stream fails
    pub fn open(mixer: Arc<Mixer>, channels: u16) -> Result<Self> {
        let sample_rate = mixer.sample_rate();
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, ch: u16| {
            c.channels() == ch
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, channels))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let device_channels = usize::from(config.channels);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.render(data, device_channels);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio output started"
        );

        Ok(Self {
            config,
            _stream: stream,
        })
    }

    /// Channel count the device was opened with
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.config.channels
    }
}
