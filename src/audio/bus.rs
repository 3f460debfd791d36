//! Bus taps for level metering
//!
//! A bus sits on a fixed point of the signal path and records the level of
//! every buffer that passes it. Readers only ever see a [`BusLevel`] snapshot.

use std::sync::atomic::{AtomicU32, Ordering};

/// Snapshot of a bus level
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BusLevel {
    /// Root-mean-square amplitude of the last buffer
    pub rms: f32,

    /// Peak absolute amplitude of the last buffer
    pub peak: f32,
}

/// A long-lived gain node with a level meter
#[derive(Debug)]
pub struct AudioBus {
    name: &'static str,
    gain: AtomicU32,
    rms: AtomicU32,
    peak: AtomicU32,
}

impl AudioBus {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            gain: AtomicU32::new(1.0f32.to_bits()),
            rms: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set the bus gain; negative and non-finite values mute the bus
    pub fn set_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Latest level snapshot
    #[must_use]
    pub fn level(&self) -> BusLevel {
        BusLevel {
            rms: f32::from_bits(self.rms.load(Ordering::Relaxed)),
            peak: f32::from_bits(self.peak.load(Ordering::Relaxed)),
        }
    }

    /// Apply gain in place and meter the result
    pub(crate) fn process(&self, buffer: &mut [f32]) {
        let gain = self.gain();
        if (gain - 1.0).abs() > f32::EPSILON {
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }
        self.store_level(buffer, 1.0);
    }

    /// Meter a buffer as it would sound after gain, leaving it untouched
    pub(crate) fn observe(&self, buffer: &[f32]) {
        self.store_level(buffer, self.gain());
    }

    fn store_level(&self, buffer: &[f32], gain: f32) {
        let (rms, peak) = measure(buffer);
        self.rms.store((rms * gain).to_bits(), Ordering::Relaxed);
        self.peak.store((peak * gain).to_bits(), Ordering::Relaxed);
    }
}

/// RMS and peak of a buffer
#[allow(clippy::cast_precision_loss)]
fn measure(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut sum_squares = 0.0f32;
    let mut peak = 0.0f32;
    for &s in samples {
        sum_squares += s * s;
        peak = peak.max(s.abs());
    }
    ((sum_squares / samples.len() as f32).sqrt(), peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_is_silent_at_unity_gain() {
        let bus = AudioBus::new("input");
        assert_eq!(bus.name(), "input");
        assert!((bus.gain() - 1.0).abs() < f32::EPSILON);
        assert_eq!(bus.level(), BusLevel::default());
    }

    #[test]
    fn process_applies_gain_and_meters() {
        let bus = AudioBus::new("output");
        bus.set_gain(0.5);

        let mut buffer = vec![1.0, -1.0, 1.0, -1.0];
        bus.process(&mut buffer);

        assert_eq!(buffer, vec![0.5, -0.5, 0.5, -0.5]);
        let level = bus.level();
        assert!((level.rms - 0.5).abs() < 1e-6);
        assert!((level.peak - 0.5).abs() < 1e-6);
    }

    #[test]
    fn observe_leaves_buffer_untouched() {
        let bus = AudioBus::new("input");
        bus.set_gain(2.0);

        let buffer = [0.25f32, -0.25];
        bus.observe(&buffer);

        assert_eq!(buffer, [0.25, -0.25]);
        assert!((bus.level().peak - 0.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_gain_mutes() {
        let bus = AudioBus::new("output");
        bus.set_gain(f32::NAN);
        assert!(bus.gain().abs() < f32::EPSILON);
        bus.set_gain(-3.0);
        assert!(bus.gain().abs() < f32::EPSILON);
    }
}
