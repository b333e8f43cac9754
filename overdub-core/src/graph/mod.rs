//! Per-track signal routing: gain, pan, analysis taps, and the
//! solo/mute gain-resolution algorithm.

use std::f32::consts::FRAC_PI_4;

use crate::capture::InputRouting;
use crate::models::levels::LevelReading;
use crate::models::track::Track;

/// Fixed window over the most recent samples flowing through a node,
/// polled by the level monitor.
///
/// A circular overwrite-oldest buffer; peak/RMS are order-insensitive
/// so readers never need the samples in arrival order.
#[derive(Debug, Clone)]
pub struct AnalysisTap {
    window: Vec<f32>,
    write_index: usize,
    filled: usize,
}

impl AnalysisTap {
    pub fn new(window_len: usize) -> Self {
        Self {
            window: vec![0.0; window_len.max(1)],
            write_index: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.window[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.window.len();
        }
        self.filled = (self.filled + samples.len()).min(self.window.len());
    }

    pub fn levels(&self) -> LevelReading {
        LevelReading::measure(&self.window[..self.filled])
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
        self.filled = 0;
    }
}

/// Node set owned by one track: effective gain, pan position, and an
/// analysis tap fed with post-gain samples.
#[derive(Debug, Clone)]
struct TrackNodes {
    gain: f32,
    pan: f32,
    tap: AnalysisTap,
}

struct InputTap {
    routing: InputRouting,
    tap: AnalysisTap,
}

/// The engine's signal-routing graph.
///
/// Tracks feed through gain and pan into the master bus; a dedicated
/// input tap receives the live capture signal while recording. The
/// graph never routes the input onward to the audible master itself;
/// that wiring decision belongs to the active capture strategy, and a
/// `SilentSink` routing contributes exactly zero gain (it only keeps
/// the tap alive).
pub struct MixGraph {
    track_window: usize,
    tracks: Vec<TrackNodes>,
    master: AnalysisTap,
    input: Option<InputTap>,
}

impl MixGraph {
    pub fn new(level_window: usize) -> Self {
        Self {
            track_window: level_window,
            tracks: Vec::new(),
            master: AnalysisTap::new(level_window),
            input: None,
        }
    }

    /// Create (or replace) the per-track node sets. Idempotent per
    /// call.
    pub fn create_track_nodes(&mut self, count: usize) {
        self.tracks = (0..count)
            .map(|_| TrackNodes {
                gain: 1.0,
                pan: 0.0,
                tap: AnalysisTap::new(self.track_window),
            })
            .collect();
        self.master.clear();
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn node_index(&self, track_id: u32) -> Option<usize> {
        let index = track_id.checked_sub(1)? as usize;
        (index < self.tracks.len()).then_some(index)
    }

    /// Set a track's gain node directly, clamped to `[0, 1]`.
    pub fn set_track_gain(&mut self, track_id: u32, gain: f32) {
        if let Some(i) = self.node_index(track_id) {
            self.tracks[i].gain = gain.clamp(0.0, 1.0);
        }
    }

    /// Set a track's pan node, clamped to `[-1, 1]`.
    pub fn set_track_pan(&mut self, track_id: u32, pan: f32) {
        if let Some(i) = self.node_index(track_id) {
            self.tracks[i].pan = pan.clamp(-1.0, 1.0);
        }
    }

    pub fn track_gain(&self, track_id: u32) -> Option<f32> {
        self.node_index(track_id).map(|i| self.tracks[i].gain)
    }

    /// Recompute and apply every track's effective gain from the
    /// combined mute/solo/volume state.
    ///
    /// Solo on one track silences every other track, so this runs
    /// over the whole set whenever ANY track's mute or solo flag
    /// changes, not just the changed one.
    pub fn resolve_effective_gains(&mut self, tracks: &[Track]) {
        let any_solo = tracks.iter().any(|t| t.is_soloed);
        for track in tracks {
            let gain = effective_gain(track, any_solo);
            self.set_track_gain(track.id, gain);
        }
    }

    /// Wire the live input tap in with the routing the capture
    /// strategy requires.
    pub fn attach_input(&mut self, routing: InputRouting) {
        self.input = Some(InputTap {
            routing,
            tap: AnalysisTap::new(self.track_window),
        });
    }

    pub fn detach_input(&mut self) {
        self.input = None;
    }

    pub fn input_attached(&self) -> bool {
        self.input.is_some()
    }

    pub fn input_routing(&self) -> Option<InputRouting> {
        self.input.as_ref().map(|i| i.routing)
    }

    /// Feed live capture samples into the input tap.
    ///
    /// Regardless of routing, nothing reaches the master bus from
    /// here: `Detached` input is off the graph, and `SilentSink`
    /// input passes through a forced-zero gain.
    pub fn ingest_input(&mut self, samples: &[f32]) {
        if let Some(input) = self.input.as_mut() {
            input.tap.push(samples);
        }
    }

    /// Mix one track's stereo block through its gain and pan nodes
    /// into `out` (both interleaved stereo, equal length), feeding
    /// the track's analysis tap with post-gain samples.
    pub fn mix_track_block(&mut self, track_id: u32, block: &[f32], out: &mut [f32]) {
        let Some(i) = self.node_index(track_id) else {
            return;
        };
        let node = &mut self.tracks[i];
        let (pan_l, pan_r) = pan_gains(node.pan);
        let gain = node.gain;

        let mut tapped = Vec::with_capacity(block.len());
        for (frame, pair) in block.chunks_exact(2).enumerate() {
            let l = pair[0] * gain * pan_l;
            let r = pair[1] * gain * pan_r;
            out[frame * 2] += l;
            out[frame * 2 + 1] += r;
            tapped.push(l);
            tapped.push(r);
        }
        node.tap.push(&tapped);
    }

    /// Feed the finished master block into the master tap.
    pub fn commit_master(&mut self, out: &[f32]) {
        self.master.push(out);
    }

    pub fn track_levels(&self, track_id: u32) -> Option<LevelReading> {
        self.node_index(track_id).map(|i| self.tracks[i].tap.levels())
    }

    pub fn master_levels(&self) -> LevelReading {
        self.master.levels()
    }

    pub fn input_levels(&self) -> Option<LevelReading> {
        self.input.as_ref().map(|i| i.tap.levels())
    }
}

/// A single track's effective playback gain: mute wins, then solo
/// elsewhere, then the track's own volume.
pub fn effective_gain(track: &Track, any_solo: bool) -> f32 {
    if track.is_muted {
        0.0
    } else if any_solo && !track.is_soloed {
        0.0
    } else {
        track.volume.clamp(0.0, 1.0)
    }
}

/// Equal-power pan: `-1` hard left, `0` center, `1` hard right.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (theta.cos(), theta.sin())
}
