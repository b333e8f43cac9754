//! Block-callback capture: the universal fallback.

use std::time::Instant;

use parking_lot::Mutex;

use crate::models::error::EngineError;

use super::{
    remap_interleaved, CaptureStrategy, ChunkAccumulator, CompleteCallback, InputRouting,
    ProgressCallback, StrategyKind,
};

const PROGRESS_INTERVAL_SECS: f64 = 0.25;

struct State {
    recording: bool,
    acc: ChunkAccumulator,
    staging: Vec<f32>,
    started_at: Option<Instant>,
    last_progress_secs: f64,
    // Callback references live here so stop() can drop them; a
    // processing closure left registered after stop leaks everything
    // it captured.
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
}

/// Captures in large blocks (hundreds to thousands of frames).
///
/// Works on every host, at the cost of higher and more variable
/// latency. The host only runs a block processor that is wired into a
/// live graph, so this strategy requires the input to be routed
/// through a silent sink, a zero-gain path to the destination.
/// Skipping that wiring means the processing callback never fires.
///
/// Block processing is also where invalid samples show up: NaN,
/// infinities, and denormals are scrubbed to zero before storage.
pub struct BlockCapture {
    sample_rate: u32,
    block_frames: usize,
    initialized: bool,
    inner: Mutex<State>,
}

impl BlockCapture {
    pub fn new(sample_rate: u32, block_frames: usize) -> Self {
        Self {
            sample_rate,
            block_frames,
            initialized: false,
            inner: Mutex::new(State {
                recording: false,
                acc: ChunkAccumulator::new(sample_rate, 2),
                staging: Vec::new(),
                started_at: None,
                last_progress_secs: 0.0,
                on_progress: None,
                on_complete: None,
            }),
        }
    }

    fn scrub(sample: f32) -> f32 {
        if !sample.is_finite() || (sample != 0.0 && sample.abs() < f32::MIN_POSITIVE) {
            0.0
        } else {
            sample
        }
    }
}

impl CaptureStrategy for BlockCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Block
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        // Block processing is the universal fallback.
        self.initialized = true;
        Ok(())
    }

    fn set_on_progress(&mut self, callback: ProgressCallback) {
        self.inner.lock().on_progress = Some(callback);
    }

    fn set_on_complete(&mut self, callback: CompleteCallback) {
        self.inner.lock().on_complete = Some(callback);
    }

    fn start(&mut self, channel_count: u16) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let mut state = self.inner.lock();
        if state.recording {
            return Err(EngineError::AlreadyRecording);
        }
        state.acc = ChunkAccumulator::new(self.sample_rate, channel_count);
        state.staging.clear();
        state.started_at = Some(Instant::now());
        state.last_progress_secs = 0.0;
        state.recording = true;
        log::debug!(
            "block capture started: {} frame blocks, {} channels",
            self.block_frames,
            state.acc.channels()
        );
        Ok(())
    }

    fn ingest(&self, samples: &[f32], _sample_rate: u32, channels: u16) {
        let progress = {
            let mut state = self.inner.lock();
            if !state.recording {
                return;
            }
            let result_channels = state.acc.channels();
            let mut remapped = remap_interleaved(samples, channels, result_channels);
            for s in remapped.iter_mut() {
                *s = Self::scrub(*s);
            }
            state.staging.append(&mut remapped);

            let block_len = self.block_frames * result_channels as usize;
            while state.staging.len() >= block_len {
                let block: Vec<f32> = state.staging.drain(..block_len).collect();
                state.acc.push_interleaved(&block, result_channels);
            }

            let elapsed = state
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            if elapsed - state.last_progress_secs >= PROGRESS_INTERVAL_SECS {
                state.last_progress_secs = elapsed;
                state.on_progress.clone().map(|cb| (cb, elapsed))
            } else {
                None
            }
        };

        if let Some((cb, elapsed)) = progress {
            cb(elapsed);
        }
    }

    fn stop(&self) {
        let completion = {
            let mut state = self.inner.lock();
            if !state.recording {
                return;
            }
            state.recording = false;

            if !state.staging.is_empty() {
                let channels = state.acc.channels();
                let staged = std::mem::take(&mut state.staging);
                state.acc.push_interleaved(&staged, channels);
            }

            let elapsed = state
                .started_at
                .take()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            let buffer = state.acc.assemble(elapsed);
            state.acc.clear();

            // Drop both callback references.
            state.on_progress = None;
            state.on_complete.take().map(|cb| (cb, buffer))
        };

        if let Some((cb, buffer)) = completion {
            log::debug!("block capture stopped: {} frames assembled", buffer.len());
            cb(Ok(buffer));
        }
    }

    fn dispose(&self) {
        let mut state = self.inner.lock();
        state.recording = false;
        state.acc.clear();
        state.staging.clear();
        state.on_progress = None;
        state.on_complete = None;
    }

    fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    fn input_routing(&self) -> InputRouting {
        InputRouting::SilentSink
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex as PlMutex;

    use super::*;
    use crate::models::sample_buffer::SampleBuffer;

    fn ready(sample_rate: u32, block: usize) -> BlockCapture {
        let mut strategy = BlockCapture::new(sample_rate, block);
        strategy.initialize().unwrap();
        strategy
    }

    fn collect_completions(
        strategy: &mut BlockCapture,
    ) -> Arc<PlMutex<Vec<Result<SampleBuffer, EngineError>>>> {
        let results = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        strategy.set_on_complete(Arc::new(move |r| sink.lock().push(r)));
        results
    }

    #[test]
    fn start_before_initialize_fails() {
        let mut strategy = BlockCapture::new(44_100, 4096);
        assert_eq!(strategy.start(2), Err(EngineError::NotInitialized));
    }

    #[test]
    fn stop_without_start_is_silent_noop() {
        let mut strategy = ready(44_100, 4096);
        let results = collect_completions(&mut strategy);
        strategy.stop();
        assert!(results.lock().is_empty());
    }

    #[test]
    fn length_tracks_elapsed_time_not_chunk_sum() {
        let mut strategy = ready(44_100, 4096);
        let results = collect_completions(&mut strategy);
        strategy.start(1).unwrap();

        // Deliver far more data than elapsed wall time accounts for:
        // the clock wins and the excess is discarded.
        strategy.ingest(&vec![0.5f32; 44_100 * 5], 44_100, 1);
        strategy.stop();

        let results = results.lock();
        let buffer = results[0].as_ref().unwrap();
        assert!(
            buffer.len() < 44_100,
            "elapsed-derived length should be well under the 5s of delivered data, got {}",
            buffer.len()
        );
    }

    #[test]
    fn scrubs_invalid_samples() {
        let mut strategy = ready(1_000, 8);
        let results = collect_completions(&mut strategy);
        strategy.start(1).unwrap();

        let chunk = [f32::NAN, 0.5, f32::INFINITY, 1.0e-40, -0.5, 0.25, 0.0, 0.75];
        strategy.ingest(&chunk, 1_000, 1);
        // Give the wall clock enough time to cover the chunk.
        thread::sleep(Duration::from_millis(30));
        strategy.stop();

        let results = results.lock();
        let buffer = results[0].as_ref().unwrap();
        assert!(buffer.len() >= 5, "need a few frames, got {}", buffer.len());
        let ch = buffer.channel(0);
        assert_eq!(ch[0], 0.0); // NaN
        assert_eq!(ch[1], 0.5);
        assert_eq!(ch[2], 0.0); // infinity
        assert_eq!(ch[3], 0.0); // denormal
        assert_eq!(ch[4], -0.5);
    }

    #[test]
    fn double_start_fails() {
        let mut strategy = ready(44_100, 4096);
        strategy.start(2).unwrap();
        assert_eq!(strategy.start(2), Err(EngineError::AlreadyRecording));
    }

    #[test]
    fn stop_drops_callback_references() {
        let mut strategy = ready(44_100, 4096);
        let held = Arc::new(());
        let probe = Arc::clone(&held);
        strategy.set_on_complete(Arc::new(move |_| {
            let _ = &probe;
        }));
        strategy.start(2).unwrap();
        strategy.stop();
        // Only the local handle remains once the closure is dropped.
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn requires_silent_sink_routing() {
        let strategy = BlockCapture::new(44_100, 4096);
        assert_eq!(strategy.input_routing(), InputRouting::SilentSink);
    }
}
