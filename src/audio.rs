//! PCM audio conversion and time accounting.
//!
//! The gateway only accepts 16 kHz mono signed-16-bit little-endian PCM.
//! All public time values are integer milliseconds since session start.

/// Sample rate every session runs at. Other rates are rejected at `Begin`.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per sample for s16le PCM.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Samples per millisecond at 16 kHz.
pub const SAMPLES_PER_MS: u64 = SAMPLE_RATE as u64 / 1000;

/// Decode a binary frame into i16 samples (little-endian pairs).
///
/// A trailing odd byte is dropped, matching the behavior of reading
/// `len / 2` samples from the raw payload.
pub fn samples_from_bytes(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert i16 samples to normalized f32 in [-1.0, 1.0].
pub fn to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert a sample count to milliseconds at 16 kHz.
pub fn samples_to_ms(samples: u64) -> u64 {
    samples / SAMPLES_PER_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_from_bytes_little_endian() {
        let data = [0x01, 0x00, 0x00, 0x80, 0xff, 0x7f];
        let samples = samples_from_bytes(&data);
        assert_eq!(samples, vec![1, i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_samples_from_bytes_drops_odd_trailing_byte() {
        let data = [0x01, 0x00, 0xab];
        assert_eq!(samples_from_bytes(&data), vec![1]);
    }

    #[test]
    fn test_to_float_bounds() {
        let floats = to_float(&[0, i16::MIN, i16::MAX, -16384]);
        assert_eq!(floats[0], 0.0);
        assert_eq!(floats[1], -1.0);
        assert!(floats[2] < 1.0 && floats[2] > 0.999);
        assert_eq!(floats[3], -0.5);
        for f in floats {
            assert!(f.abs() <= 1.0);
        }
    }

    #[test]
    fn test_samples_to_ms() {
        assert_eq!(samples_to_ms(0), 0);
        assert_eq!(samples_to_ms(16), 1);
        assert_eq!(samples_to_ms(16_000), 1000);
        assert_eq!(samples_to_ms(48_000), 3000);
    }
}
