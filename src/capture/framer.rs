//! Fixed-size block framing with optional resampling

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Requested resampler input chunk; rubato may round it up
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Cuts a live mono stream into blocks of exactly `block_size` samples at the
/// target rate
pub struct BlockFramer {
    resampler: Option<FftFixedIn<f32>>,
    chunk_in: usize,
    in_buf: Vec<f32>,
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    /// Create a framer converting `in_hz` input into `out_hz` blocks
    ///
    /// # Errors
    ///
    /// Returns error if the block size is zero or the resampler cannot be built
    pub fn new(in_hz: u32, out_hz: u32, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Config("block size must be non-zero".to_string()));
        }

        let resampler = if in_hz == out_hz {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(
                in_hz as usize,
                out_hz as usize,
                RESAMPLER_CHUNK_SIZE,
                1,
                1,
            )
            .map_err(|e| Error::Audio(format!("failed to create resampler: {e}")))?;
            Some(resampler)
        };

        let chunk_in = resampler
            .as_ref()
            .map_or(RESAMPLER_CHUNK_SIZE, |r| r.input_frames_next());

        Ok(Self {
            resampler,
            chunk_in,
            in_buf: Vec::with_capacity(chunk_in),
            block_size,
            pending: Vec::with_capacity(block_size),
        })
    }

    /// Feed samples, calling `emit` once per completed block
    pub fn push(&mut self, mut src: &[f32], mut emit: impl FnMut(&[f32])) {
        if self.resampler.is_none() {
            self.emit_blocks(src, &mut emit);
            return;
        }

        while !src.is_empty() {
            let space = self.chunk_in - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == self.chunk_in {
                let processed = self
                    .resampler
                    .as_mut()
                    .map(|r| r.process(&[&self.in_buf[..]], None));
                match processed {
                    Some(Ok(out)) => self.emit_blocks(&out[0], &mut emit),
                    Some(Err(e)) => tracing::warn!(error = %e, "resampler dropped a chunk"),
                    None => {}
                }
                self.in_buf.clear();
            }
        }
    }

    /// Discard buffered audio
    pub fn clear(&mut self) {
        self.in_buf.clear();
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    fn emit_blocks(&mut self, mut data: &[f32], emit: &mut impl FnMut(&[f32])) {
        while !data.is_empty() {
            let space = self.block_size - self.pending.len();
            let take = space.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.block_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }
}

/// Average interleaved frames down to mono, reusing `out`'s allocation
#[allow(clippy::cast_precision_loss)]
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_emits_exact_blocks() {
        let mut framer = BlockFramer::new(16000, 16000, 4).unwrap();
        let mut blocks = Vec::new();

        framer.push(&[1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());

        framer.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b| blocks.push(b.to_vec()));
        assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
    }

    #[test]
    fn clear_drops_partial_block() {
        let mut framer = BlockFramer::new(16000, 16000, 4).unwrap();
        let mut blocks = Vec::new();

        framer.push(&[1.0, 2.0], |b| blocks.push(b.to_vec()));
        framer.clear();
        framer.push(&[3.0, 4.0, 5.0, 6.0], |b| blocks.push(b.to_vec()));
        assert_eq!(blocks, vec![vec![3.0, 4.0, 5.0, 6.0]]);
    }

    #[test]
    fn resampling_produces_target_rate_blocks() {
        let mut framer = BlockFramer::new(48000, 16000, 256).unwrap();
        let mut total = 0usize;
        let mut sizes_ok = true;

        // One second of input should yield roughly one second of output
        let input = vec![0.1f32; 48000];
        framer.push(&input, |b| {
            sizes_ok &= b.len() == 256;
            total += b.len();
        });

        assert!(sizes_ok);
        assert!(total > 14000 && total <= 16000, "got {total} samples");
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(BlockFramer::new(16000, 16000, 0).is_err());
    }

    #[test]
    fn downmix_averages_frames() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5]);

        downmix_into(&[0.25, 0.75], 1, &mut out);
        assert_eq!(out, vec![0.25, 0.75]);
    }
}
