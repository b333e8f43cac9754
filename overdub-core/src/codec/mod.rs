//! Container codec seam used by the container capture strategy.
//!
//! The strategy feeds time-sliced sample chunks through a
//! [`ChunkCodec`] while recording and decodes the concatenated byte
//! stream back into raw samples when it stops. Decode is fallible:
//! malformed or truncated data surfaces as
//! `EngineError::DecodeFailure`, never as a silently empty result.

use crate::models::error::EngineError;

/// Raw samples recovered from an encoded stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, `frames * channels` long.
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Encodes interleaved f32 chunks into an opaque byte stream and
/// decodes the concatenation back.
pub trait ChunkCodec: Send + Sync {
    /// Stream header emitted once, before the first chunk.
    fn begin(&self, sample_rate: u32, channels: u16) -> Vec<u8>;

    /// Encode one time-sliced chunk of interleaved samples.
    fn encode(&self, samples: &[f32]) -> Vec<u8>;

    /// Decode a complete stream (header plus concatenated chunks).
    fn decode(&self, data: &[u8]) -> Result<DecodedAudio, EngineError>;

    /// Codec identifier for logging.
    fn name(&self) -> &str;
}

/// Framed 16-bit little-endian PCM.
///
/// Stream layout:
/// ```text
/// [0-3]   "ODPC"
/// [4-7]   sample_rate (u32 LE)
/// [8-9]   channels (u16 LE)
/// [10-11] bit depth (u16 LE, always 16)
/// [12-]   i16 LE samples, interleaved
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcm16Codec;

const MAGIC: &[u8; 4] = b"ODPC";
const HEADER_LEN: usize = 12;

impl ChunkCodec for Pcm16Codec {
    fn begin(&self, sample_rate: u32, channels: u16) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&sample_rate.to_le_bytes());
        header.extend_from_slice(&channels.to_le_bytes());
        header.extend_from_slice(&16u16.to_le_bytes());
        header
    }

    fn encode(&self, samples: &[f32]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = (clamped * i16::MAX as f32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    fn decode(&self, data: &[u8]) -> Result<DecodedAudio, EngineError> {
        if data.len() < HEADER_LEN {
            return Err(EngineError::DecodeFailure("stream shorter than header".into()));
        }
        if &data[0..4] != MAGIC {
            return Err(EngineError::DecodeFailure("bad stream magic".into()));
        }
        let sample_rate = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let channels = u16::from_le_bytes([data[8], data[9]]);
        let bit_depth = u16::from_le_bytes([data[10], data[11]]);
        if bit_depth != 16 {
            return Err(EngineError::DecodeFailure(format!(
                "unsupported bit depth: {}",
                bit_depth
            )));
        }
        if channels == 0 || sample_rate == 0 {
            return Err(EngineError::DecodeFailure("corrupt stream header".into()));
        }

        let body = &data[HEADER_LEN..];
        if body.len() % 2 != 0 {
            return Err(EngineError::DecodeFailure("truncated sample data".into()));
        }

        let mut samples = Vec::with_capacity(body.len() / 2);
        for pair in body.chunks_exact(2) {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            samples.push(value as f32 / i16::MAX as f32);
        }

        Ok(DecodedAudio {
            sample_rate,
            channels,
            samples,
        })
    }

    fn name(&self) -> &str {
        "pcm16"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = Pcm16Codec;
        let mut stream = codec.begin(44_100, 2);
        stream.extend(codec.encode(&[0.0, 0.5, -0.5, 1.0]));
        stream.extend(codec.encode(&[-1.0, 0.25]));

        let decoded = codec.decode(&stream).unwrap();
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frame_count(), 3);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-3);
        assert!((decoded.samples[3] - 1.0).abs() < 1e-6);
        assert!((decoded.samples[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let codec = Pcm16Codec;
        let bytes = codec.encode(&[2.0, -3.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -i16::MAX);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let codec = Pcm16Codec;
        let mut stream = codec.begin(44_100, 1);
        stream[0] = b'X';
        assert!(matches!(
            codec.decode(&stream),
            Err(EngineError::DecodeFailure(_))
        ));
    }

    #[test]
    fn decode_rejects_short_stream() {
        let codec = Pcm16Codec;
        assert!(matches!(
            codec.decode(b"ODPC"),
            Err(EngineError::DecodeFailure(_))
        ));
    }

    #[test]
    fn decode_rejects_truncated_samples() {
        let codec = Pcm16Codec;
        let mut stream = codec.begin(44_100, 1);
        stream.extend(codec.encode(&[0.5]));
        stream.pop();
        assert!(matches!(
            codec.decode(&stream),
            Err(EngineError::DecodeFailure(_))
        ));
    }

    #[test]
    fn header_only_stream_is_empty_audio() {
        let codec = Pcm16Codec;
        let stream = codec.begin(48_000, 2);
        let decoded = codec.decode(&stream).unwrap();
        assert_eq!(decoded.frame_count(), 0);
    }
}
