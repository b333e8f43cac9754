//! Low-latency capture: small fixed blocks on the audio clock.

use parking_lot::Mutex;

use crate::models::error::EngineError;
use crate::traits::input::HostCapabilities;

use super::{
    remap_interleaved, CaptureStrategy, ChunkAccumulator, CompleteCallback, InputRouting,
    ProgressCallback, StrategyKind,
};

/// Progress is reported roughly every quarter second of audio.
const PROGRESS_INTERVAL_SECS: f64 = 0.25;

struct State {
    recording: bool,
    acc: ChunkAccumulator,
    /// Interleaved staging at the result channel count, drained in
    /// fixed blocks.
    staging: Vec<f32>,
    frames_total: usize,
    last_progress_block: usize,
}

/// Captures in fixed small blocks (typically 128 frames) for minimal
/// round-trip latency.
///
/// Elapsed time and progress are derived from the delivered-frame
/// count rather than a wall clock, keeping them tied to the audio
/// clock. The input must stay disconnected from the audible
/// destination while recording; routing it onward causes feedback.
pub struct LowLatencyCapture {
    sample_rate: u32,
    block_frames: usize,
    capabilities: HostCapabilities,
    initialized: bool,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    inner: Mutex<State>,
}

impl LowLatencyCapture {
    pub fn new(sample_rate: u32, block_frames: usize, capabilities: HostCapabilities) -> Self {
        Self {
            sample_rate,
            block_frames,
            capabilities,
            initialized: false,
            on_progress: None,
            on_complete: None,
            inner: Mutex::new(State {
                recording: false,
                acc: ChunkAccumulator::new(sample_rate, 2),
                staging: Vec::new(),
                frames_total: 0,
                last_progress_block: 0,
            }),
        }
    }

    fn progress_block_interval(&self) -> usize {
        let blocks = PROGRESS_INTERVAL_SECS * self.sample_rate as f64 / self.block_frames as f64;
        (blocks.round() as usize).max(1)
    }
}

impl CaptureStrategy for LowLatencyCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LowLatency
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        if !self.capabilities.low_latency_processing {
            return Err(EngineError::PlatformUnsupported(
                "host lacks low-latency block processing".into(),
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
        let mut state = self.inner.lock();
        if state.recording {
            return Err(EngineError::AlreadyRecording);
        }
        state.acc = ChunkAccumulator::new(self.sample_rate, channel_count);
        state.staging.clear();
        state.frames_total = 0;
        state.last_progress_block = 0;
        state.recording = true;
        log::debug!(
            "low-latency capture started: {} frame blocks, {} channels",
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
            state.frames_total += remapped.len() / result_channels as usize;
            state.staging.append(&mut remapped);

            // Drain whole blocks into the accumulator.
            let block_len = self.block_frames * result_channels as usize;
            while state.staging.len() >= block_len {
                let block: Vec<f32> = state.staging.drain(..block_len).collect();
                state.acc.push_interleaved(&block, result_channels);
            }

            let block_count = state.frames_total / self.block_frames;
            if block_count >= state.last_progress_block + self.progress_block_interval() {
                state.last_progress_block = block_count;
                Some(state.frames_total as f64 / self.sample_rate as f64)
            } else {
                None
            }
        };

        // Callbacks run outside the lock; they may re-enter the
        // strategy (e.g. a max-duration guard calling stop).
        if let (Some(elapsed), Some(cb)) = (progress, self.on_progress.as_ref()) {
            cb(elapsed);
        }
    }

    fn stop(&self) {
        let assembled = {
            let mut state = self.inner.lock();
            if !state.recording {
                return;
            }
            state.recording = false;

            // Flush the final partial block.
            if !state.staging.is_empty() {
                let channels = state.acc.channels();
                let staged = std::mem::take(&mut state.staging);
                state.acc.push_interleaved(&staged, channels);
            }

            let elapsed = state.frames_total as f64 / self.sample_rate as f64;
            let buffer = state.acc.assemble(elapsed);
            state.acc.clear();
            buffer
        };

        log::debug!(
            "low-latency capture stopped: {} frames assembled",
            assembled.len()
        );
        if let Some(cb) = self.on_complete.as_ref() {
            cb(Ok(assembled));
        }
    }

    fn dispose(&self) {
        let mut state = self.inner.lock();
        state.recording = false;
        state.acc.clear();
        state.staging.clear();
    }

    fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    fn input_routing(&self) -> InputRouting {
        InputRouting::Detached
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex as PlMutex;

    use super::*;
    use crate::models::sample_buffer::SampleBuffer;

    fn capable() -> HostCapabilities {
        HostCapabilities {
            low_latency_processing: true,
        }
    }

    fn collect_completions(
        strategy: &mut LowLatencyCapture,
    ) -> Arc<PlMutex<Vec<Result<SampleBuffer, EngineError>>>> {
        let results = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        strategy.set_on_complete(Arc::new(move |r| sink.lock().push(r)));
        results
    }

    #[test]
    fn initialize_requires_capability() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, HostCapabilities::default());
        assert!(matches!(
            strategy.initialize(),
            Err(EngineError::PlatformUnsupported(_))
        ));
    }

    #[test]
    fn start_before_initialize_fails() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        assert_eq!(strategy.start(2), Err(EngineError::NotInitialized));
    }

    #[test]
    fn double_start_fails() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        strategy.initialize().unwrap();
        strategy.start(2).unwrap();
        assert_eq!(strategy.start(2), Err(EngineError::AlreadyRecording));
    }

    #[test]
    fn stop_without_start_is_silent_noop() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        strategy.initialize().unwrap();
        let results = collect_completions(&mut strategy);
        strategy.stop();
        assert!(results.lock().is_empty());
    }

    #[test]
    fn completes_once_with_frame_count_length() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        strategy.initialize().unwrap();
        let results = collect_completions(&mut strategy);
        strategy.start(2).unwrap();

        // 2.0 seconds of stereo audio in uneven chunk sizes.
        let mut delivered = 0usize;
        let chunk_sizes = [480usize, 512, 1000, 128];
        let mut i = 0;
        while delivered < 88_200 {
            let frames = chunk_sizes[i % chunk_sizes.len()].min(88_200 - delivered);
            let chunk = vec![0.25f32; frames * 2];
            strategy.ingest(&chunk, 44_100, 2);
            delivered += frames;
            i += 1;
        }

        strategy.stop();
        strategy.stop(); // second stop does nothing

        let results = results.lock();
        assert_eq!(results.len(), 1);
        let buffer = results[0].as_ref().unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert!((buffer.len() as i64 - 88_200).abs() <= 1);
        assert_eq!(buffer.channel(0)[0], 0.25);
        assert_eq!(buffer.channel(1)[88_199], 0.25);
    }

    #[test]
    fn channel_request_capped_at_stereo() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        strategy.initialize().unwrap();
        let results = collect_completions(&mut strategy);
        strategy.start(4).unwrap();
        strategy.ingest(&vec![0.5f32; 4 * 256], 44_100, 4);
        strategy.stop();

        let results = results.lock();
        assert_eq!(results[0].as_ref().unwrap().channel_count(), 2);
    }

    #[test]
    fn progress_follows_the_audio_clock() {
        let mut strategy = LowLatencyCapture::new(44_100, 128, capable());
        strategy.initialize().unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let tick_sink = Arc::clone(&ticks);
        strategy.set_on_progress(Arc::new(move |_| {
            tick_sink.fetch_add(1, Ordering::SeqCst);
        }));
        strategy.start(1).unwrap();

        // One second of mono input: roughly four quarter-second
        // progress reports.
        for _ in 0..345 {
            strategy.ingest(&[0.0f32; 128], 44_100, 1);
        }
        let count = ticks.load(Ordering::SeqCst);
        assert!((3..=5).contains(&count), "got {} progress ticks", count);
        strategy.stop();
    }

    #[test]
    fn restart_after_stop_produces_fresh_buffer() {
        let mut strategy = LowLatencyCapture::new(1_000, 10, capable());
        strategy.initialize().unwrap();
        let results = collect_completions(&mut strategy);

        strategy.start(1).unwrap();
        strategy.ingest(&vec![0.1f32; 500], 1_000, 1);
        strategy.stop();

        strategy.start(1).unwrap();
        strategy.ingest(&vec![0.2f32; 250], 1_000, 1);
        strategy.stop();

        let results = results.lock();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 500);
        let second = results[1].as_ref().unwrap();
        assert_eq!(second.len(), 250);
        assert_eq!(second.channel(0)[0], 0.2);
    }

    #[test]
    fn routing_stays_detached() {
        let strategy = LowLatencyCapture::new(44_100, 128, capable());
        assert_eq!(strategy.input_routing(), InputRouting::Detached);
    }
}
