//! # Audio Capture Module
//!
//! This module handles microphone capture and PCM encoding for the live-call
//! pipeline. It produces the fixed-size binary frames the session transport
//! streams to the analysis service.
//!
//! ## Key Components:
//! - **Capture Controller**: Owns the microphone stream and its worker thread
//! - **Block Assembler**: Downmix, resample, and cut capture input into blocks
//! - **PCM Encoder**: Float-to-i16 conversion and little-endian byte packing
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//! - **Block Size**: 4096 samples per frame (~256 ms of audio)
//!
//! The capture device rarely speaks this format natively; the block assembler
//! converts whatever the platform delivers into the wire contract above.

pub mod buffer;       // Block assembly: downmix, resample, fixed-size framing
pub mod capture;      // Microphone capture controller
pub mod encoder;      // PCM conversion and byte packing

/// Pipeline sample rate in Hz. Everything downstream of the block assembler
/// runs at this rate.
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per outbound frame (~256 ms at 16 kHz).
pub const BLOCK_SIZE: usize = 4096;

/// One outbound audio frame: `BLOCK_SIZE` mono samples at `SAMPLE_RATE`.
///
/// ## Ownership:
/// Frames are transient. The capture callback builds one, hands it to the
/// session transport's send call, and nothing retains it afterwards. A
/// frame that cannot be sent right away is dropped, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap a block of PCM samples as a frame.
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Size of this frame on the wire (two bytes per sample).
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }
}
