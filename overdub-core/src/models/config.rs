/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of tracks created at initialization (default: 4).
    pub track_count: usize,

    /// Engine sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Capture channel count requested from the input device
    /// (default: 2). Results are capped at stereo regardless.
    pub channel_count: u16,

    /// Maximum recording duration in seconds before a forced stop
    /// (default: 300).
    pub max_recording_secs: f64,

    /// Analysis-tap window length in samples (default: 2048).
    pub level_window: usize,

    /// Block size of the low-latency capture strategy, in frames.
    pub low_latency_block: usize,

    /// Block size of the block-callback capture strategy, in frames.
    pub block_size: usize,

    /// Time-slice duration of the container capture strategy.
    pub container_slice_secs: f64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.track_count == 0 {
            return Err("track count must be at least 1".into());
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if !(1..=2).contains(&self.channel_count) {
            return Err(format!("unsupported channel count: {}", self.channel_count));
        }
        if self.max_recording_secs <= 0.0 {
            return Err("max recording duration must be positive".into());
        }
        if self.level_window == 0 || self.low_latency_block == 0 || self.block_size == 0 {
            return Err("buffer sizes must be positive".into());
        }
        if self.container_slice_secs <= 0.0 {
            return Err("container slice duration must be positive".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            track_count: 4,
            sample_rate: 44_100,
            channel_count: 2,
            max_recording_secs: 300.0,
            level_window: 2048,
            low_latency_block: 128,
            block_size: 4096,
            container_slice_secs: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_tracks() {
        let config = EngineConfig {
            track_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_channel_count() {
        let config = EngineConfig {
            channel_count: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
