use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::levels::LevelReading;
use super::sample_buffer::{RecordingInfo, SampleBuffer};

/// One recorder track.
///
/// Tracks are created once at engine construction and live until
/// disposal; a new recording replaces the buffer in place.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub name: String,
    pub buffer: Option<Arc<SampleBuffer>>,
    pub info: Option<RecordingInfo>,
    pub is_recording: bool,
    pub is_playing: bool,
    pub is_muted: bool,
    pub is_soloed: bool,
    /// Playback volume, `0.0..=1.0`.
    pub volume: f32,
    /// Stereo pan, `-1.0` (left) to `1.0` (right).
    pub pan: f32,
    /// Last level reported by the monitor.
    pub level: LevelReading,
}

impl Track {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: format!("Track {}", id),
            buffer: None,
            info: None,
            is_recording: false,
            is_playing: false,
            is_muted: false,
            is_soloed: false,
            volume: 1.0,
            pan: 0.0,
            level: LevelReading::default(),
        }
    }

    /// Whether the track can produce playback audio right now.
    pub fn is_playable(&self) -> bool {
        self.buffer.is_some() && !self.is_muted
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            name: self.name.clone(),
            has_buffer: self.buffer.is_some(),
            duration_secs: self.buffer.as_ref().map(|b| b.duration_secs()),
            is_recording: self.is_recording,
            is_playing: self.is_playing,
            is_muted: self.is_muted,
            is_soloed: self.is_soloed,
            volume: self.volume,
            pan: self.pan,
            level: self.level,
        }
    }
}

/// UI-facing view of a track, without the sample data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: u32,
    pub name: String,
    pub has_buffer: bool,
    pub duration_secs: Option<f64>,
    pub is_recording: bool,
    pub is_playing: bool,
    pub is_muted: bool,
    pub is_soloed: bool,
    pub volume: f32,
    pub pan: f32,
    pub level: LevelReading,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_track_defaults() {
        let track = Track::new(3);
        assert_eq!(track.id, 3);
        assert_eq!(track.name, "Track 3");
        assert_eq!(track.volume, 1.0);
        assert_eq!(track.pan, 0.0);
        assert!(!track.is_playable());
    }

    #[test]
    fn playable_requires_buffer_and_unmuted() {
        let mut track = Track::new(1);
        track.buffer = Some(Arc::new(SampleBuffer::new(44_100, vec![vec![0.0; 10]])));
        assert!(track.is_playable());
        track.is_muted = true;
        assert!(!track.is_playable());
    }

    #[test]
    fn snapshot_reflects_buffer() {
        let mut track = Track::new(2);
        assert!(!track.snapshot().has_buffer);
        track.buffer = Some(Arc::new(SampleBuffer::new(44_100, vec![vec![0.0; 44_100]])));
        let snap = track.snapshot();
        assert!(snap.has_buffer);
        assert!((snap.duration_secs.unwrap() - 1.0).abs() < 1e-9);
    }
}
