//! Synchronized multi-voice playback against the mix graph.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::MixGraph;
use crate::models::error::EngineError;
use crate::models::sample_buffer::SampleBuffer;
use crate::models::track::Track;

/// Fired when one voice finishes, with its track id. Each voice ends
/// independently of the others.
pub type VoiceEndedCallback = Arc<dyn Fn(u32) + Send + Sync + 'static>;

/// Fired exactly once per playback run, after the last voice ends
/// naturally. Manual stop does not fire it.
pub type PlaybackEndedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Playback window and loop flag, applied uniformly to every voice
/// started together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub looped: bool,
    pub start_secs: f64,
    pub end_secs: Option<f64>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            looped: false,
            start_secs: 0.0,
            end_secs: None,
        }
    }
}

struct Voice {
    track_id: u32,
    buffer: Arc<SampleBuffer>,
    position: usize,
    start_frame: usize,
    /// Exclusive end frame within the buffer.
    end_frame: usize,
    looping: bool,
    done: bool,
}

struct PlaybackState {
    voices: Vec<Voice>,
    frames_rendered: usize,
    active: bool,
    paused: bool,
    ended_signaled: bool,
}

/// Starts and renders simultaneous per-track voices, sharing one
/// start instant, and reports per-voice and aggregate completion.
///
/// Rendering is driven externally by the host output callback;
/// elapsed time derives from frames actually rendered (the audio
/// clock), not a wall clock.
pub struct PlaybackCoordinator {
    sample_rate: u32,
    inner: Mutex<PlaybackState>,
    on_voice_ended: Mutex<Option<VoiceEndedCallback>>,
    on_all_ended: Mutex<Option<PlaybackEndedCallback>>,
}

impl PlaybackCoordinator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            inner: Mutex::new(PlaybackState {
                voices: Vec::new(),
                frames_rendered: 0,
                active: false,
                paused: false,
                ended_signaled: false,
            }),
            on_voice_ended: Mutex::new(None),
            on_all_ended: Mutex::new(None),
        }
    }

    pub fn set_on_voice_ended(&self, callback: VoiceEndedCallback) {
        *self.on_voice_ended.lock() = Some(callback);
    }

    pub fn set_on_all_ended(&self, callback: PlaybackEndedCallback) {
        *self.on_all_ended.lock() = Some(callback);
    }

    /// Start playback of every playable track (has a buffer, not
    /// muted). Any prior playback is stopped first.
    ///
    /// Returns the ids of the tracks that became voices.
    pub fn start(
        &self,
        tracks: &[Track],
        options: PlaybackOptions,
    ) -> Result<Vec<u32>, EngineError> {
        self.stop();

        let mut voices = Vec::new();
        for track in tracks.iter().filter(|t| t.is_playable()) {
            let Some(buffer) = track.buffer.clone() else { continue };
            let rate = buffer.sample_rate() as f64;
            let len = buffer.len();
            let start_frame = ((options.start_secs * rate).round() as usize).min(len);
            let end_frame = options
                .end_secs
                .map(|e| ((e * rate).round() as usize).min(len))
                .unwrap_or(len)
                .max(start_frame);
            voices.push(Voice {
                track_id: track.id,
                buffer,
                position: start_frame,
                start_frame,
                end_frame,
                looping: options.looped,
                done: start_frame >= end_frame,
            });
        }

        if voices.iter().all(|v| v.done) {
            return Err(EngineError::NoPlayableTracks);
        }

        let started: Vec<u32> = voices.iter().filter(|v| !v.done).map(|v| v.track_id).collect();
        log::info!("playback started: {} voices", started.len());

        let mut state = self.inner.lock();
        state.voices = voices;
        state.frames_rendered = 0;
        state.active = true;
        state.paused = false;
        state.ended_signaled = false;
        Ok(started)
    }

    /// Render the next block of interleaved stereo into `out`,
    /// mixing every live voice through the graph. Called from the
    /// host render thread.
    pub fn render(&self, out: &mut [f32], graph: &Mutex<MixGraph>) {
        out.fill(0.0);
        let frames = out.len() / 2;

        let (ended_voices, all_ended) = {
            let mut state = self.inner.lock();
            if !state.active || state.paused {
                graph.lock().commit_master(out);
                return;
            }

            let mut graph = graph.lock();
            let mut ended = Vec::new();
            for voice in state.voices.iter_mut().filter(|v| !v.done) {
                let mut block = vec![0.0f32; frames * 2];
                for frame in 0..frames {
                    if voice.position >= voice.end_frame {
                        if voice.looping && voice.end_frame > voice.start_frame {
                            voice.position = voice.start_frame;
                        } else {
                            voice.done = true;
                            ended.push(voice.track_id);
                            break;
                        }
                    }
                    block[frame * 2] = voice.buffer.sample(0, voice.position);
                    block[frame * 2 + 1] = voice.buffer.sample(1, voice.position);
                    voice.position += 1;
                }
                // A voice whose last frame landed on this block ends
                // with the block, not one render later.
                if !voice.done && !voice.looping && voice.position >= voice.end_frame {
                    voice.done = true;
                    ended.push(voice.track_id);
                }
                graph.mix_track_block(voice.track_id, &block, out);
            }
            graph.commit_master(out);
            drop(graph);

            state.frames_rendered += frames;

            let all_done = state.voices.iter().all(|v| v.done);
            let fire_all = all_done && !state.ended_signaled;
            if fire_all {
                state.ended_signaled = true;
                state.active = false;
            }
            (ended, fire_all)
        };

        // Signal outside the lock; handlers re-enter the engine.
        if !ended_voices.is_empty() {
            if let Some(cb) = self.on_voice_ended.lock().clone() {
                for id in &ended_voices {
                    cb(*id);
                }
            }
        }
        if all_ended {
            log::info!("playback finished: last voice ended");
            if let Some(cb) = self.on_all_ended.lock().clone() {
                cb();
            }
        }
    }

    /// Stop all voices without firing the aggregate end signal.
    /// Per-voice end callbacks still fire so playing flags clear.
    pub fn stop(&self) {
        let ended: Vec<u32> = {
            let mut state = self.inner.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.ended_signaled = true;
            state
                .voices
                .iter_mut()
                .filter(|v| !v.done)
                .map(|v| {
                    v.done = true;
                    v.track_id
                })
                .collect()
        };

        if let Some(cb) = self.on_voice_ended.lock().clone() {
            for id in &ended {
                cb(*id);
            }
        }
    }

    /// Hold all voice positions while rendering silence.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    pub fn resume(&self) {
        self.inner.lock().paused = false;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn active_voice_count(&self) -> usize {
        self.inner.lock().voices.iter().filter(|v| !v.done).count()
    }

    /// Elapsed playback time on the audio clock.
    pub fn elapsed_secs(&self) -> f64 {
        self.inner.lock().frames_rendered as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn track_with_buffer(id: u32, frames: usize, value: f32) -> Track {
        let mut track = Track::new(id);
        track.buffer = Some(Arc::new(SampleBuffer::new(
            1_000,
            vec![vec![value; frames], vec![value; frames]],
        )));
        track
    }

    fn test_graph(count: usize) -> Mutex<MixGraph> {
        let mut graph = MixGraph::new(256);
        graph.create_track_nodes(count);
        Mutex::new(graph)
    }

    #[test]
    fn start_without_playable_tracks_fails() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let tracks = vec![Track::new(1), Track::new(2)];
        assert_eq!(
            coordinator.start(&tracks, PlaybackOptions::default()),
            Err(EngineError::NoPlayableTracks)
        );
    }

    #[test]
    fn muted_tracks_are_excluded() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let mut tracks = vec![
            track_with_buffer(1, 100, 0.5),
            track_with_buffer(2, 100, 0.5),
        ];
        tracks[0].is_muted = true;

        let started = coordinator.start(&tracks, PlaybackOptions::default()).unwrap();
        assert_eq!(started, vec![2]);
        assert_eq!(coordinator.active_voice_count(), 1);
    }

    #[test]
    fn voices_end_individually_and_aggregate_fires_once() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let ended = Arc::new(Mutex::new(Vec::new()));
        let all_ended = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&ended);
        coordinator.set_on_voice_ended(Arc::new(move |id| sink.lock().push(id)));
        let sink = Arc::clone(&all_ended);
        coordinator.set_on_all_ended(Arc::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        // Track 1 has 40 frames, track 2 has 100: they end at
        // different render blocks.
        let tracks = vec![
            track_with_buffer(1, 40, 0.5),
            track_with_buffer(2, 100, 0.5),
        ];
        let graph = test_graph(2);
        coordinator.start(&tracks, PlaybackOptions::default()).unwrap();

        let mut out = vec![0.0f32; 50 * 2];
        coordinator.render(&mut out, &graph);
        assert_eq!(*ended.lock(), vec![1]);
        assert_eq!(all_ended.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.active_voice_count(), 1);

        coordinator.render(&mut out, &graph);
        assert_eq!(*ended.lock(), vec![1, 2]);
        assert_eq!(all_ended.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_active());

        // Further renders stay silent on the signal front.
        coordinator.render(&mut out, &graph);
        assert_eq!(all_ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn playback_window_offsets_all_voices() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let tracks = vec![track_with_buffer(1, 1_000, 0.5)];
        let graph = test_graph(1);

        coordinator
            .start(
                &tracks,
                PlaybackOptions {
                    looped: false,
                    start_secs: 0.2,
                    end_secs: Some(0.3),
                },
            )
            .unwrap();

        // 100-frame window: finished after 100 rendered frames.
        let mut out = vec![0.0f32; 60 * 2];
        coordinator.render(&mut out, &graph);
        assert_eq!(coordinator.active_voice_count(), 1);
        coordinator.render(&mut out, &graph);
        assert_eq!(coordinator.active_voice_count(), 0);
    }

    #[test]
    fn looped_voice_never_finishes() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let tracks = vec![track_with_buffer(1, 30, 0.5)];
        let graph = test_graph(1);

        coordinator
            .start(
                &tracks,
                PlaybackOptions {
                    looped: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let mut out = vec![0.0f32; 50 * 2];
        for _ in 0..10 {
            coordinator.render(&mut out, &graph);
        }
        assert!(coordinator.is_active());
        assert_eq!(coordinator.active_voice_count(), 1);
    }

    #[test]
    fn restart_stops_prior_run_first() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let tracks = vec![track_with_buffer(1, 500, 0.5)];
        let graph = test_graph(1);

        coordinator.start(&tracks, PlaybackOptions::default()).unwrap();
        let mut out = vec![0.0f32; 100 * 2];
        coordinator.render(&mut out, &graph);
        assert!((coordinator.elapsed_secs() - 0.1).abs() < 1e-9);

        coordinator.start(&tracks, PlaybackOptions::default()).unwrap();
        assert_eq!(coordinator.elapsed_secs(), 0.0);
        assert_eq!(coordinator.active_voice_count(), 1);
    }

    #[test]
    fn pause_holds_position_and_clock() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let tracks = vec![track_with_buffer(1, 500, 0.5)];
        let graph = test_graph(1);

        coordinator.start(&tracks, PlaybackOptions::default()).unwrap();
        let mut out = vec![0.0f32; 100 * 2];
        coordinator.render(&mut out, &graph);
        let elapsed = coordinator.elapsed_secs();

        coordinator.pause();
        coordinator.render(&mut out, &graph);
        assert_eq!(coordinator.elapsed_secs(), elapsed);
        assert!(out.iter().all(|&s| s == 0.0));

        coordinator.resume();
        coordinator.render(&mut out, &graph);
        assert!(coordinator.elapsed_secs() > elapsed);
    }

    #[test]
    fn manual_stop_skips_aggregate_signal() {
        let coordinator = PlaybackCoordinator::new(1_000);
        let ended = Arc::new(Mutex::new(Vec::new()));
        let all_ended = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&ended);
        coordinator.set_on_voice_ended(Arc::new(move |id| sink.lock().push(id)));
        let sink = Arc::clone(&all_ended);
        coordinator.set_on_all_ended(Arc::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
        }));

        let tracks = vec![track_with_buffer(1, 500, 0.5)];
        coordinator.start(&tracks, PlaybackOptions::default()).unwrap();
        coordinator.stop();

        assert_eq!(*ended.lock(), vec![1]);
        assert_eq!(all_ended.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_active());
    }
}
