//! PCM codec for the live session wire format
//!
//! Audio crosses the session as base64-framed 16-bit little-endian PCM tagged
//! with a mime type such as `audio/pcm;rate=16000`.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Mime type prefix for raw PCM payloads
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Sample rate used to tag outbound audio when none is given
pub const DEFAULT_CAPTURE_RATE: u32 = 16000;

/// Scale applied when quantizing floats to i16
const ENCODE_SCALE: f32 = 32767.0;

/// Scale applied when expanding i16 back to floats
const DECODE_SCALE: f32 = 32768.0;

/// A block of PCM audio with its format metadata
///
/// Samples are interleaved when `channels > 1`. The sample storage is shared,
/// so cloning a chunk is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioChunk {
    /// Wrap samples with their format
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Interleaved sample data
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample data
    #[must_use]
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Transport-encoded audio: a mime tag plus a base64 payload
///
/// Field names follow the session's JSON blob shape (`mimeType`, `data`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBlob {
    /// Mime type, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,

    /// Base64-encoded little-endian i16 samples
    pub data: String,
}

impl EncodedBlob {
    /// Sample rate declared in the mime tag, if any
    #[must_use]
    pub fn sample_rate(&self) -> Option<u32> {
        parse_mime_rate(&self.mime_type)
    }
}

/// Encode float samples tagged with the default capture rate
#[must_use]
pub fn encode(samples: &[f32]) -> EncodedBlob {
    encode_with_rate(samples, DEFAULT_CAPTURE_RATE)
}

/// Encode float samples tagged with `sample_rate`
///
/// Each sample is clamped to `[-1, 1]`, scaled by 32767 and rounded. Non-finite
/// input must be filtered upstream; NaN quantizes to silence.
#[must_use]
pub fn encode_with_rate(samples: &[f32], sample_rate: u32) -> EncodedBlob {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }

    EncodedBlob {
        mime_type: format!("{PCM_MIME_PREFIX};rate={sample_rate}"),
        data: STANDARD.encode(bytes),
    }
}

/// Decode a blob back into i16 samples
///
/// # Errors
///
/// Returns `MalformedBlob` if the payload is not valid base64 or its byte
/// length is odd
pub fn decode(blob: &EncodedBlob) -> Result<Vec<i16>> {
    let bytes = STANDARD
        .decode(blob.data.as_bytes())
        .map_err(|e| Error::MalformedBlob(format!("invalid base64 payload: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedBlob(format!(
            "payload length {} is not a whole number of i16 samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Expand raw i16 samples into a playable chunk
#[must_use]
pub fn render_to_audio_buffer(raw: &[i16], sample_rate: u32, channels: u16) -> AudioChunk {
    let samples = raw.iter().map(|&v| f32::from(v) / DECODE_SCALE).collect();
    AudioChunk::new(samples, sample_rate, channels)
}

/// Read the `rate=` parameter of a PCM mime tag
#[must_use]
pub fn parse_mime_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * ENCODE_SCALE).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_tags_pcm_mime() {
        let blob = encode(&[0.0, 0.5]);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(blob.sample_rate(), Some(16000));
    }

    #[test]
    fn encode_is_little_endian() {
        let blob = encode(&[1.0, -1.0, 0.0]);
        let bytes = STANDARD.decode(blob.data).unwrap();
        assert_eq!(bytes, vec![0xff, 0x7f, 0x01, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let raw = decode(&encode(&[4.0, -7.5])).unwrap();
        assert_eq!(raw, vec![32767, -32767]);
    }

    #[test]
    fn encode_rounds_to_nearest() {
        // 0.5 * 32767 = 16383.5 rounds away from zero
        let raw = decode(&encode(&[0.5, -0.5])).unwrap();
        assert_eq!(raw, vec![16384, -16384]);
    }

    #[test]
    fn nan_quantizes_to_silence() {
        let raw = decode(&encode(&[f32::NAN])).unwrap();
        assert_eq!(raw, vec![0]);
    }

    #[test]
    fn empty_input_encodes_empty_payload() {
        let blob = encode(&[]);
        assert!(blob.data.is_empty());
        assert!(decode(&blob).unwrap().is_empty());
    }

    #[test]
    fn round_trip_stays_within_one_quantization_step() {
        let samples: Vec<f32> = (-1000..=1000).map(|i| i as f32 / 1000.0).collect();
        let raw = decode(&encode(&samples)).unwrap();

        assert_eq!(raw.len(), samples.len());
        for (original, quantized) in samples.iter().zip(&raw) {
            let restored = f32::from(*quantized) / ENCODE_SCALE;
            assert!(
                (restored - original).abs() <= 1.0 / 32768.0,
                "{original} came back as {restored}"
            );
        }
    }

    #[test]
    fn decode_rejects_odd_length() {
        let blob = EncodedBlob {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: STANDARD.encode([1u8, 2, 3]),
        };
        assert!(matches!(decode(&blob), Err(Error::MalformedBlob(_))));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let blob = EncodedBlob {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: "not base64!!".to_string(),
        };
        assert!(matches!(decode(&blob), Err(Error::MalformedBlob(_))));
    }

    #[test]
    fn render_divides_by_full_scale() {
        let chunk = render_to_audio_buffer(&[16384, -32768, 0], 24000, 1);
        assert_eq!(chunk.samples(), &[0.5, -1.0, 0.0]);
        assert_eq!(chunk.sample_rate(), 24000);
        assert_eq!(chunk.channels(), 1);
    }

    #[test]
    fn chunk_duration_counts_frames() {
        let mono = AudioChunk::new(vec![0.0; 24000], 24000, 1);
        assert!((mono.duration() - 1.0).abs() < f64::EPSILON);

        let stereo = AudioChunk::new(vec![0.0; 24000], 24000, 2);
        assert_eq!(stereo.frames(), 12000);
        assert!((stereo.duration() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_mime_rate_variants() {
        assert_eq!(parse_mime_rate("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(parse_mime_rate("audio/pcm; RATE = 16000"), Some(16000));
        assert_eq!(parse_mime_rate("audio/pcm"), None);
        assert_eq!(parse_mime_rate("audio/pcm;rate=fast"), None);
    }
}
