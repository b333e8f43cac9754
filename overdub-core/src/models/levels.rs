use serde::{Deserialize, Serialize};

/// One metering reading: peak absolute sample and RMS, both in
/// `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LevelReading {
    pub peak: f32,
    pub rms: f32,
}

impl LevelReading {
    /// Compute peak and RMS over a sample window, clamped to `[0, 1]`.
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / samples.len() as f32).sqrt();
        Self {
            peak: peak.clamp(0.0, 1.0),
            rms: rms.clamp(0.0, 1.0),
        }
    }
}

/// A complete metering report for one monitor tick.
///
/// Snapshots are independent: nothing is diffed against the previous
/// tick. `input` is present only while a recording holds the input
/// tap open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub input: Option<LevelReading>,
    pub tracks: Vec<(u32, LevelReading)>,
    pub master: LevelReading,
}

/// Host audio parameters reported once the engine is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub sample_rate: u32,
    pub base_latency_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn measure_constant_signal() {
        // Zero variance: peak and RMS are both exactly the value.
        let samples = vec![0.5f32; 1000];
        let reading = LevelReading::measure(&samples);
        assert_relative_eq!(reading.peak, 0.5);
        assert_relative_eq!(reading.rms, 0.5);
    }

    #[test]
    fn measure_clamps_out_of_range_peak() {
        let reading = LevelReading::measure(&[1.5, -2.0, 0.5]);
        assert_relative_eq!(reading.peak, 1.0);
        assert!(reading.rms <= 1.0);
    }

    #[test]
    fn measure_empty_is_silent() {
        assert_eq!(LevelReading::measure(&[]), LevelReading::default());
    }

    #[test]
    fn measure_silence() {
        let reading = LevelReading::measure(&[0.0; 64]);
        assert_eq!(reading.peak, 0.0);
        assert_eq!(reading.rms, 0.0);
    }
}
