//! # PCM Encoding
//!
//! Converts captured floating-point samples into the signed 16-bit
//! little-endian PCM format the analysis service expects on the wire.
//!
//! ## Key Functions:
//! - **Sample conversion**: Clamp [-1.0, 1.0] floats onto the full i16 range
//! - **Block conversion**: Encode a whole capture block in one pass
//! - **Byte packing**: Serialize i16 samples as little-endian wire bytes

use byteorder::{ByteOrder, LittleEndian};

/// Convert one floating-point sample to a signed 16-bit PCM sample.
///
/// ## Conversion:
/// The input is clamped to [-1.0, 1.0] first, then scaled by 32768 so that
/// -1.0 lands exactly on i16::MIN. The final clamp folds the +32768 produced
/// by a +1.0 input back onto i16::MAX.
///
/// ## Boundary values:
/// - `1.0` → `32767`
/// - `-1.0` → `-32768`
/// - `0.0` → `0`
pub fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let scaled = clamped * 32768.0;
    scaled.clamp(-32768.0, 32767.0) as i16
}

/// Convert a block of float samples to 16-bit PCM.
pub fn encode_block(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&sample| sample_to_i16(sample)).collect()
}

/// Serialize PCM samples as little-endian bytes for the wire.
///
/// ## Wire format:
/// Two bytes per sample, least-significant byte first, no header or
/// delimiter. A full frame is exactly 2 × block size bytes; the service
/// accepts frames back-to-back with no application-level framing.
pub fn frame_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}
