//! Sample-accurate mixer for scheduled sources
//!
//! The mixer is the rendering half of the output context. An output stream
//! calls [`Mixer::render`] for every device buffer; each call mixes whichever
//! sources overlap the buffer's span, applies the output bus, advances the
//! [`FrameClock`] and fires completion callbacks for sources that ended.

use std::sync::{Arc, Mutex, PoisonError};

use crate::audio::{AudioBus, FrameClock};

use super::source::{CompletionFn, PlaybackSource, SourceId, SourceSink};

struct Voice {
    id: SourceId,
    samples: Arc<[f32]>,
    channels: usize,
    start_frame: u64,
    on_ended: Option<CompletionFn>,
}

impl Voice {
    fn frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.frames()
    }
}

/// Renders scheduled sources against a frame clock
pub struct Mixer {
    clock: Arc<FrameClock>,
    output_bus: Arc<AudioBus>,
    voices: Mutex<Vec<Voice>>,
}

impl Mixer {
    #[must_use]
    pub fn new(clock: Arc<FrameClock>, output_bus: Arc<AudioBus>) -> Self {
        Self {
            clock,
            output_bus,
            voices: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn clock(&self) -> Arc<FrameClock> {
        Arc::clone(&self.clock)
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    /// Number of sources queued or playing
    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every voice without firing completions
    pub fn stop_all(&self) {
        let mut voices = self.voices.lock().unwrap_or_else(PoisonError::into_inner);
        if !voices.is_empty() {
            tracing::debug!(voices = voices.len(), "mixer cleared");
        }
        voices.clear();
    }

    /// Render one interleaved device buffer
    ///
    /// Mono sources are spread across every device channel; multichannel
    /// sources map channel `n` to device channel `n % source_channels`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(&self, out: &mut [f32], device_channels: usize) {
        out.fill(0.0);
        let device_channels = device_channels.max(1);
        let frames = (out.len() / device_channels) as u64;
        let block_start = self.clock.frames();
        let block_end = block_start + frames;
        let mut ended: Vec<CompletionFn> = Vec::new();

        {
            let mut voices = self.voices.lock().unwrap_or_else(PoisonError::into_inner);
            voices.retain_mut(|voice| {
                // A voice scheduled behind the clock keeps its place on the
                // timeline; the frames already past are skipped
                let voice_end = voice.end_frame();
                if voice.start_frame < block_end && voice_end > block_start {
                    let from = voice.start_frame.max(block_start);
                    let to = voice_end.min(block_end);
                    for t in from..to {
                        let out_frame = (t - block_start) as usize * device_channels;
                        let src_frame = (t - voice.start_frame) as usize * voice.channels;
                        for ch in 0..device_channels {
                            out[out_frame + ch] += voice.samples[src_frame + ch % voice.channels];
                        }
                    }
                }

                if voice_end <= block_end {
                    if let Some(on_ended) = voice.on_ended.take() {
                        ended.push(on_ended);
                    }
                    return false;
                }
                true
            });
        }

        self.output_bus.process(out);
        self.clock.advance(frames);

        for on_ended in ended {
            on_ended();
        }
    }
}

impl SourceSink for Mixer {
    fn schedule(&self, mut source: PlaybackSource) {
        let chunk = source.chunk();
        if chunk.sample_rate() != self.sample_rate() {
            tracing::warn!(
                chunk_rate = chunk.sample_rate(),
                output_rate = self.sample_rate(),
                "scheduling chunk at a different rate than the output clock"
            );
        }

        let voice = Voice {
            id: source.id(),
            samples: chunk.shared_samples(),
            channels: usize::from(chunk.channels()),
            start_frame: self.clock.frame_at(source.start_time()),
            on_ended: source.take_on_ended(),
        };

        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice);
    }

    fn stop(&self, id: SourceId) {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|voice| voice.id != id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::audio::AudioChunk;

    fn mixer(rate: u32) -> Mixer {
        Mixer::new(
            Arc::new(FrameClock::new(rate)),
            Arc::new(AudioBus::new("output")),
        )
    }

    fn source(id: SourceId, samples: Vec<f32>, start: f64, fired: &Arc<AtomicUsize>) -> PlaybackSource {
        let fired = Arc::clone(fired);
        PlaybackSource::new(
            id,
            AudioChunk::new(samples, 10, 1),
            start,
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn renders_sources_back_to_back() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.1, 0.1, 0.1], 0.0, &fired));
        mixer.schedule(source(2, vec![0.2, 0.2], 0.3, &fired));

        let mut out = vec![9.0; 6];
        mixer.render(&mut out, 1);

        assert_eq!(out, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.0]);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(mixer.voice_count(), 0);
        assert_eq!(mixer.clock().frames(), 6);
    }

    #[test]
    fn source_spanning_buffers_completes_in_the_last_one() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.5; 5], 0.2, &fired));

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5]);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.0]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mono_source_fills_every_device_channel() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.25, 0.5], 0.0, &fired));

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0.25, 0.25, 0.5, 0.5]);
    }

    #[test]
    fn stopped_source_is_silent_and_never_completes() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(7, vec![0.5; 4], 0.0, &fired));
        mixer.stop(7);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn late_source_skips_its_missed_head() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.1, 0.2, 0.3, 0.4], 0.0, &fired));
        mixer.clock().advance(2);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.3, 0.4, 0.0, 0.0]);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_source_does_not_overlap_its_successor() {
        let mixer = mixer(10);
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![1.0; 4], 0.0, &fired));
        mixer.schedule(source(2, vec![2.0; 4], 0.4, &fired));

        // The clock moved on before the first voice was ever rendered
        mixer.clock().advance(2);

        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 0.0, 0.0]);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_entirely_in_the_past_is_completed_silently() {
        let mixer = mixer(10);
        let mut out = vec![0.0; 5];
        mixer.render(&mut out, 1);

        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.3, 0.3], 0.1, &fired));
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn output_bus_gain_applies_to_the_mix() {
        let bus = Arc::new(AudioBus::new("output"));
        bus.set_gain(0.5);
        let mixer = Mixer::new(Arc::new(FrameClock::new(10)), Arc::clone(&bus));
        let fired = Arc::new(AtomicUsize::new(0));
        mixer.schedule(source(1, vec![0.8, 0.8], 0.0, &fired));

        let mut out = vec![0.0; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.4, 0.4]);
        assert!((bus.level().peak - 0.4).abs() < 1e-6);
    }
}
