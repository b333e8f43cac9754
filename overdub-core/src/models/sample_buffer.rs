use serde::{Deserialize, Serialize};

/// Channel-separated float sample data produced by a completed
/// capture session.
///
/// Invariant: every channel holds exactly the same number of samples.
/// Values are nominally in `[-1.0, 1.0]` but may exceed that range
/// transiently; nothing here clamps them.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from per-channel sample arrays.
    ///
    /// Panics if `channels` is empty or the channel lengths differ;
    /// capture assembly always produces equal-length channels, so a
    /// mismatch is a bug, not a runtime condition.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        assert!(!channels.is_empty(), "a sample buffer needs at least one channel");
        let len = channels[0].len();
        assert!(
            channels.iter().all(|c| c.len() == len),
            "channel lengths differ"
        );
        Self { sample_rate, channels }
    }

    /// An empty buffer with the given shape (zero-length recording).
    pub fn empty(sample_rate: u32, channel_count: u16) -> Self {
        Self::new(sample_rate, vec![Vec::new(); channel_count.max(1) as usize])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Sample for `channel` at `frame`, treating a missing channel as
    /// a mirror of the last one (mono buffers play centered).
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        let ch = channel.min(self.channels.len() - 1);
        self.channels[ch].get(frame).copied().unwrap_or(0.0)
    }
}

/// Metadata attached to a completed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub id: String,
    pub track_id: u32,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub created_at: String,
}

impl RecordingInfo {
    pub fn new(track_id: u32, buffer: &SampleBuffer) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            track_id,
            duration_secs: buffer.duration_secs(),
            sample_rate: buffer.sample_rate(),
            channel_count: buffer.channel_count(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
