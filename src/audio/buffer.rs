//! # Capture Block Assembly
//!
//! Turns whatever the capture device delivers into the pipeline's wire
//! contract: mono, 16 kHz, fixed 4096-sample blocks. Capture callbacks
//! arrive with device-native channel counts, sample rates, and chunk sizes,
//! none of which line up with frame boundaries.
//!
//! ## Key Features:
//! - **Channel downmix**: Interleaved multi-channel input is averaged to mono
//! - **Linear resampling**: Device rate to 16 kHz, continuous across chunks
//! - **Block framing**: Samples accumulate until a full frame can be cut
//!
//! ## Thread Safety:
//! Not shared. The assembler lives inside the capture callback closure and
//! is only touched from the device's callback thread.

use crate::audio::encoder;
use crate::audio::{AudioFrame, BLOCK_SIZE, SAMPLE_RATE};
use std::collections::VecDeque;

/// Streaming converter from device-native audio to pipeline frames.
///
/// ## Resampling approach:
/// Linear interpolation with a one-sample carry between chunks: the last
/// input sample of each push is prepended to the next window so output
/// positions that fall between two callback chunks still interpolate against
/// their true neighbors. The read position advances by
/// `device_rate / 16000` input samples per output sample.
pub struct BlockAssembler {
    /// Interleaved channels in the device stream
    channels: usize,

    /// Input samples consumed per output sample
    step: f64,

    /// Fractional read position within the current resample window
    pos: f64,

    /// Last input sample of the previous chunk, for interpolation continuity
    carry: Option<f32>,

    /// Converted samples waiting to fill a block
    pending: VecDeque<i16>,
}

impl BlockAssembler {
    /// Create an assembler for a device stream.
    ///
    /// ## Parameters:
    /// - **device_sample_rate**: native rate of the capture stream in Hz
    /// - **channels**: interleaved channel count of the capture stream
    pub fn new(device_sample_rate: u32, channels: u16) -> Self {
        Self {
            channels: channels.max(1) as usize,
            step: device_sample_rate as f64 / SAMPLE_RATE as f64,
            pos: 0.0,
            carry: None,
            pending: VecDeque::with_capacity(BLOCK_SIZE * 2),
        }
    }

    /// Feed one capture callback's worth of interleaved samples.
    ///
    /// ## Returns:
    /// Every complete `BLOCK_SIZE` frame that became available. Usually zero
    /// or one frame per callback; more when the device hands over large
    /// chunks.
    pub fn push(&mut self, input: &[f32]) -> Vec<AudioFrame> {
        if input.is_empty() {
            return Vec::new();
        }

        // Downmix interleaved channels by averaging each sample frame.
        let mono: Vec<f32> = if self.channels == 1 {
            input.to_vec()
        } else {
            input
                .chunks(self.channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        // Resample window: previous chunk's final sample plus this chunk.
        let mut window = Vec::with_capacity(mono.len() + 1);
        if let Some(prev) = self.carry {
            window.push(prev);
        }
        window.extend_from_slice(&mono);

        // Emit output samples while both interpolation neighbors are in the
        // window; the final sample waits for the next chunk.
        let limit = (window.len() - 1) as f64;
        while self.pos < limit {
            let idx = self.pos as usize;
            let frac = (self.pos - idx as f64) as f32;
            let sample = window[idx] * (1.0 - frac) + window[idx + 1] * frac;
            self.pending.push_back(encoder::sample_to_i16(sample));
            self.pos += self.step;
        }
        self.carry = window.last().copied();
        self.pos -= limit;

        // Cut every complete block.
        let mut frames = Vec::new();
        while self.pending.len() >= BLOCK_SIZE {
            let samples: Vec<i16> = self.pending.drain(..BLOCK_SIZE).collect();
            frames.push(AudioFrame::new(samples));
        }
        frames
    }

    /// Converted samples accumulated but not yet cut into a frame.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_framing_at_native_rate() {
        let mut assembler = BlockAssembler::new(SAMPLE_RATE, 1);
        // One input sample is always held back for interpolation continuity,
        // so BLOCK_SIZE + 1 inputs yield exactly one frame.
        let frames = assembler.push(&vec![0.5f32; BLOCK_SIZE + 1]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), BLOCK_SIZE);
        assert!(frames[0].samples.iter().all(|&s| s == 16384));
        assert_eq!(assembler.pending_samples(), 0);
    }

    #[test]
    fn test_small_pushes_accumulate_into_one_frame() {
        let mut assembler = BlockAssembler::new(SAMPLE_RATE, 1);
        assert!(assembler.push(&vec![0.0f32; BLOCK_SIZE / 2]).is_empty());
        let frames = assembler.push(&vec![0.0f32; BLOCK_SIZE / 2 + 1]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let mut assembler = BlockAssembler::new(SAMPLE_RATE, 2);
        let mut input = Vec::with_capacity((BLOCK_SIZE + 1) * 2);
        for _ in 0..(BLOCK_SIZE + 1) {
            input.push(0.2);
            input.push(0.4);
        }
        let frames = assembler.push(&input);
        assert_eq!(frames.len(), 1);
        let expected = encoder::sample_to_i16(0.3);
        assert!(frames[0]
            .samples
            .iter()
            .all(|&s| (s - expected).abs() <= 1));
    }

    #[test]
    fn test_downsampling_from_48k() {
        let mut assembler = BlockAssembler::new(48_000, 1);
        // Three input samples per output sample at 16 kHz.
        let frames = assembler.push(&vec![1.0f32; BLOCK_SIZE * 3 + 1]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples.iter().all(|&s| s == 32767));
    }

    #[test]
    fn test_interpolation_between_samples() {
        // 24 kHz in, 16 kHz out: every second output lands halfway between
        // two input samples.
        let mut assembler = BlockAssembler::new(24_000, 1);
        assembler.push(&[0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(assembler.pending_samples(), 3);
    }
}
