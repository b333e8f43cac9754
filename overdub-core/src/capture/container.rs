//! Container capture: encode/decode round trip through the host
//! codec.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::codec::ChunkCodec;
use crate::models::error::EngineError;
use crate::models::sample_buffer::SampleBuffer;
use crate::models::state::SessionPhase;

use super::{
    remap_interleaved, CaptureStrategy, CompleteCallback, InputRouting, ProgressCallback,
    StrategyKind,
};

const PROGRESS_INTERVAL_SECS: f64 = 0.25;

struct State {
    phase: SessionPhase,
    /// Concatenated encoded stream (header plus chunks).
    encoded: Vec<u8>,
    /// Interleaved staging at the result channel count, flushed
    /// through the codec one time slice at a time.
    staging: Vec<f32>,
    channels: u16,
    started_at: Option<Instant>,
    last_progress_secs: f64,
    /// Disposal requested while finalizing; honored when the
    /// finalizer thread completes.
    dispose_requested: bool,
}

/// Captures by pushing audio through a [`ChunkCodec`] in time slices
/// (about 500 ms each) and decoding the concatenation on stop.
///
/// Completion is genuinely asynchronous: stop flushes the remaining
/// partial slice (losing it would drop the recording tail), moves to
/// `Finalizing`, and decodes on a separate thread. Tearing down the
/// internal buffers before that decode finishes silently truncates
/// the recording, so disposal during `Finalizing` is deferred.
pub struct ContainerCapture {
    sample_rate: u32,
    slice_frames: usize,
    codec: Option<Arc<dyn ChunkCodec>>,
    initialized: bool,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    inner: Arc<Mutex<State>>,
}

impl ContainerCapture {
    pub fn new(sample_rate: u32, slice_secs: f64, codec: Option<Arc<dyn ChunkCodec>>) -> Self {
        Self {
            sample_rate,
            slice_frames: ((sample_rate as f64 * slice_secs) as usize).max(1),
            codec,
            initialized: false,
            on_progress: None,
            on_complete: None,
            inner: Arc::new(Mutex::new(State {
                phase: SessionPhase::Idle,
                encoded: Vec::new(),
                staging: Vec::new(),
                channels: 2,
                started_at: None,
                last_progress_secs: 0.0,
                dispose_requested: false,
            })),
        }
    }

    /// Whether the asynchronous finalization is still in flight.
    pub fn is_finalizing(&self) -> bool {
        self.inner.lock().phase.is_finalizing()
    }

    fn flush_slice(state: &mut State, codec: &dyn ChunkCodec, slice_len: usize) {
        let slice: Vec<f32> = state.staging.drain(..slice_len.min(state.staging.len())).collect();
        if !slice.is_empty() {
            let chunk = codec.encode(&slice);
            state.encoded.extend_from_slice(&chunk);
        }
    }

    /// Rebuild a channel-separated buffer from decoded interleaved
    /// samples, sized by the elapsed clock (zero-filled tail, early
    /// stop on overflow).
    fn build_buffer(
        sample_rate: u32,
        channels: u16,
        decoded_channels: u16,
        samples: &[f32],
        elapsed_secs: f64,
    ) -> SampleBuffer {
        let target = (elapsed_secs * sample_rate as f64).round().max(0.0) as usize;
        let src = decoded_channels.max(1) as usize;
        let frames = (samples.len() / src).min(target);

        let mut out = vec![vec![0.0f32; target]; channels.max(1) as usize];
        for (ch, dest) in out.iter_mut().enumerate() {
            let src_ch = ch.min(src - 1);
            for (frame, slot) in dest.iter_mut().take(frames).enumerate() {
                *slot = samples[frame * src + src_ch];
            }
        }
        SampleBuffer::new(sample_rate, out)
    }
}

impl CaptureStrategy for ContainerCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Container
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.codec.is_none() {
            return Err(EngineError::PlatformUnsupported(
                "no container codec available".into(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    fn set_on_progress(&mut self, callback: ProgressCallback) {
        self.on_progress = Some(callback);
    }

    fn set_on_complete(&mut self, callback: CompleteCallback) {
        self.on_complete = Some(callback);
    }

    fn start(&mut self, channel_count: u16) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let codec = self.codec.as_ref().ok_or(EngineError::NotInitialized)?;

        let mut state = self.inner.lock();
        if !matches!(state.phase, SessionPhase::Idle) {
            return Err(EngineError::AlreadyRecording);
        }
        state.channels = channel_count.clamp(1, 2);
        state.encoded = codec.begin(self.sample_rate, state.channels);
        state.staging.clear();
        state.started_at = Some(Instant::now());
        state.last_progress_secs = 0.0;
        state.dispose_requested = false;
        state.phase = SessionPhase::Recording;
        log::debug!(
            "container capture started: {} codec, {} frame slices",
            codec.name(),
            self.slice_frames
        );
        Ok(())
    }

    fn ingest(&self, samples: &[f32], _sample_rate: u32, channels: u16) {
        let codec = match self.codec.as_ref() {
            Some(c) => Arc::clone(c),
            None => return,
        };

        let progress = {
            let mut state = self.inner.lock();
            if !state.phase.is_recording() {
                return;
            }
            let result_channels = state.channels;
            let mut remapped = remap_interleaved(samples, channels, result_channels);
            state.staging.append(&mut remapped);

            let slice_len = self.slice_frames * result_channels as usize;
            while state.staging.len() >= slice_len {
                Self::flush_slice(&mut state, codec.as_ref(), slice_len);
            }

            let elapsed = state
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            if elapsed - state.last_progress_secs >= PROGRESS_INTERVAL_SECS {
                state.last_progress_secs = elapsed;
                Some(elapsed)
            } else {
                None
            }
        };

        if let (Some(elapsed), Some(cb)) = (progress, self.on_progress.as_ref()) {
            cb(elapsed);
        }
    }

    fn stop(&self) {
        let codec = match self.codec.as_ref() {
            Some(c) => Arc::clone(c),
            None => return,
        };

        let (encoded, channels, elapsed) = {
            let mut state = self.inner.lock();
            if !state.phase.is_recording() {
                return;
            }

            // Request the remaining sub-slice before finalizing;
            // dropping it loses the last half second of audio.
            let pending = state.staging.len();
            if pending > 0 {
                Self::flush_slice(&mut state, codec.as_ref(), pending);
            }

            let elapsed = state
                .started_at
                .take()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            state.phase = SessionPhase::Finalizing;
            (std::mem::take(&mut state.encoded), state.channels, elapsed)
        };

        let inner = Arc::clone(&self.inner);
        let on_complete = self.on_complete.clone();
        let sample_rate = self.sample_rate;

        thread::Builder::new()
            .name("capture-finalize".into())
            .spawn(move || {
                let outcome = codec.decode(&encoded).map(|decoded| {
                    Self::build_buffer(
                        sample_rate,
                        channels,
                        decoded.channels,
                        &decoded.samples,
                        elapsed,
                    )
                });

                if let Err(ref e) = outcome {
                    log::error!("container capture decode failed: {}", e);
                }
                if let Some(cb) = on_complete {
                    cb(outcome);
                }

                let mut state = inner.lock();
                state.phase = SessionPhase::Idle;
                if state.dispose_requested {
                    state.dispose_requested = false;
                    state.encoded = Vec::new();
                    state.staging = Vec::new();
                    log::debug!("deferred container capture disposal completed");
                }
            })
            .expect("failed to spawn finalizer thread");
    }

    fn dispose(&self) {
        let mut state = self.inner.lock();
        if state.phase.is_finalizing() {
            // The finalizer still needs the buffers; clear them when
            // it completes.
            state.dispose_requested = true;
            return;
        }
        state.phase = SessionPhase::Idle;
        state.encoded = Vec::new();
        state.staging = Vec::new();
    }

    fn is_recording(&self) -> bool {
        self.inner.lock().phase.is_recording()
    }

    fn input_routing(&self) -> InputRouting {
        InputRouting::Detached
    }
}
