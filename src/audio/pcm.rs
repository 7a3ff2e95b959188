//! PCM16 wire codec.
//!
//! Samples cross the wire as little-endian 16-bit signed integers. Encoding
//! scales asymmetrically (negative samples by 32768, non-negative by 32767)
//! so that a full-scale float maps onto the full integer range without
//! overflow; decoding divides by 32768.

/// Encode float samples to little-endian PCM16 bytes.
///
/// Out-of-range input is clamped to [-1.0, 1.0] before scaling.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian PCM16 bytes to float samples.
///
/// A trailing odd byte carries no sample and is dropped.
pub fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}
