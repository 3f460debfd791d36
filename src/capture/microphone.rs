//! Microphone access

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Callback receiving interleaved input samples on the audio thread
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Native format of an opened input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// An input device the capture chain can acquire and release
pub trait Microphone {
    /// Acquire the device and report its format
    ///
    /// # Errors
    ///
    /// Returns `DeviceAccess` if there is no device or access is denied
    fn open(&mut self) -> Result<InputFormat>;

    /// Start delivering samples to `on_samples`
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started
    fn start(&mut self, on_samples: SampleCallback) -> Result<()>;

    /// Stop the stream and release the device; safe to call repeatedly
    fn close(&mut self);
}

/// Default system microphone via cpal
///
/// Prefers a mono config at the preferred rate and falls back to the
/// device's default input config; the capture chain resamples and downmixes.
pub struct CpalMicrophone {
    preferred_rate: u32,
    device: Option<Device>,
    config: Option<StreamConfig>,
    stream: Option<Stream>,
}

impl CpalMicrophone {
    #[must_use]
    pub const fn new(preferred_rate: u32) -> Self {
        Self {
            preferred_rate,
            device: None,
            config: None,
            stream: None,
        }
    }

    fn select_config(&self, device: &Device) -> Result<StreamConfig> {
        let rate = SampleRate(self.preferred_rate);
        let exact = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceAccess(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .map(|c| c.with_sample_rate(rate).config());

        if let Some(config) = exact {
            return Ok(config);
        }

        device
            .default_input_config()
            .map(|c| c.config())
            .map_err(|e| Error::DeviceAccess(e.to_string()))
    }
}

impl Microphone for CpalMicrophone {
    fn open(&mut self) -> Result<InputFormat> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceAccess("no input device available".to_string()))?;

        let config = self.select_config(&device)?;
        let format = InputFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "microphone opened"
        );

        self.device = Some(device);
        self.config = Some(config);
        Ok(format)
    }

    fn start(&mut self, mut on_samples: SampleCallback) -> Result<()> {
        let (Some(device), Some(config)) = (&self.device, &self.config) else {
            return Err(Error::DeviceAccess("microphone not opened".to_string()));
        };

        let stream = device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| on_samples(data),
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceAccess(e.to_string()))?;

        stream.play().map_err(|e| Error::DeviceAccess(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        self.config = None;
        self.device = None;
    }
}
