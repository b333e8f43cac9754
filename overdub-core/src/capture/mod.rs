//! Capture strategies: turning a live input stream into a
//! [`SampleBuffer`].
//!
//! Three interchangeable strategies exist, tried in fallback order by
//! [`select_strategy`]:
//!
//! 1. [`ContainerCapture`] — routes audio through the host codec in
//!    time slices; the encode/decode round trip sidesteps manual
//!    buffer-copy corruption, at the cost of an asynchronous decode
//!    before completion.
//! 2. [`LowLatencyCapture`] — small fixed blocks on the audio clock;
//!    lowest round-trip latency, not universally available.
//! 3. [`BlockCapture`] — large blocks, works everywhere, must defend
//!    against invalid samples and needs silent-sink wiring.
//!
//! Every chunk handed to `ingest` is owned by the host and reused
//! after the call returns; each strategy copies it element-by-element
//! before storing anything. Holding a reference instead silently
//! corrupts previously recorded data.

pub mod block;
pub mod container;
pub mod low_latency;

use std::fmt;
use std::sync::Arc;

use crate::codec::ChunkCodec;
use crate::models::config::EngineConfig;
use crate::models::error::EngineError;
use crate::models::sample_buffer::SampleBuffer;
use crate::traits::input::HostCapabilities;

pub use block::BlockCapture;
pub use container::ContainerCapture;
pub use low_latency::LowLatencyCapture;

/// Fired repeatedly while recording, with elapsed seconds.
/// Monotonically non-decreasing.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync + 'static>;

/// Fired exactly once per successful `start`, strictly after
/// `stop()`, once all buffered data has been reassembled. A decode
/// failure arrives as `Err` and delivers no buffer.
pub type CompleteCallback =
    Arc<dyn Fn(Result<SampleBuffer, EngineError>) + Send + Sync + 'static>;

/// How the live input may be wired toward the audible master bus
/// while this strategy records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRouting {
    /// Input stays off the audible path entirely.
    Detached,
    /// Input is wired through a zero-gain sink: the tap stays live
    /// without producing audible output.
    SilentSink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Container,
    LowLatency,
    Block,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::LowLatency => write!(f, "low-latency"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// One mechanism for capturing a live input stream.
///
/// Lifecycle: `initialize` (may fail `PlatformUnsupported`), then
/// `start` / `ingest`×N / `stop`, repeatable. `start` while recording
/// fails `AlreadyRecording`; `stop` when not recording is a silent
/// no-op. `ingest` is called from the host capture thread; everything
/// else from the orchestrator.
pub trait CaptureStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Verify host support. Fails with `PlatformUnsupported` to
    /// trigger fallback to the next strategy.
    fn initialize(&mut self) -> Result<(), EngineError>;

    fn set_on_progress(&mut self, callback: ProgressCallback);

    fn set_on_complete(&mut self, callback: CompleteCallback);

    /// Begin buffering. `channel_count` is the requested count; the
    /// result is capped at stereo.
    fn start(&mut self, channel_count: u16) -> Result<(), EngineError>;

    /// Deliver one interleaved chunk from the capture thread.
    fn ingest(&self, samples: &[f32], sample_rate: u32, channels: u16);

    /// Stop buffering and reassemble. Idempotent; completion fires
    /// at most once per `start`.
    fn stop(&self);

    /// Release internal buffers. Deferred while a finalization is in
    /// flight.
    fn dispose(&self);

    fn is_recording(&self) -> bool;

    /// Graph wiring this strategy requires while recording.
    fn input_routing(&self) -> InputRouting;
}

/// Ordered chunk storage shared by all strategies.
///
/// `push_interleaved` performs the defensive copy; `assemble` builds
/// the final channel-separated buffer. The target length comes from
/// elapsed time × sample rate, NOT from summed chunk lengths: chunk
/// delivery can be irregular, so the clock is treated as ground
/// truth. A result longer than the delivered data is zero-filled at
/// the tail; copying stops early rather than overflow when the final
/// partial chunk overcounts.
#[derive(Debug)]
pub struct ChunkAccumulator {
    sample_rate: u32,
    channels: u16,
    chunks: Vec<Vec<Vec<f32>>>,
    total_frames: usize,
}

impl ChunkAccumulator {
    /// `requested_channels` is capped to stereo here; more source
    /// channels are silently truncated.
    pub fn new(sample_rate: u32, requested_channels: u16) -> Self {
        Self {
            sample_rate,
            channels: requested_channels.clamp(1, 2),
            chunks: Vec::new(),
            total_frames: 0,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Copy one interleaved chunk into owned, channel-separated
    /// storage. A missing source channel mirrors the last available
    /// one; extra source channels are dropped.
    pub fn push_interleaved(&mut self, samples: &[f32], src_channels: u16) {
        let src_channels = src_channels.max(1) as usize;
        let frames = samples.len() / src_channels;
        if frames == 0 {
            return;
        }

        let mut chunk = Vec::with_capacity(self.channels as usize);
        for ch in 0..self.channels as usize {
            let src = ch.min(src_channels - 1);
            let mut channel = Vec::with_capacity(frames);
            for frame in 0..frames {
                channel.push(samples[frame * src_channels + src]);
            }
            chunk.push(channel);
        }
        self.chunks.push(chunk);
        self.total_frames += frames;
    }

    /// Reassemble everything buffered so far into a contiguous
    /// buffer of `round(elapsed_secs × sample_rate)` frames.
    pub fn assemble(&self, elapsed_secs: f64) -> SampleBuffer {
        let target = (elapsed_secs * self.sample_rate as f64).round().max(0.0) as usize;
        let mut channels = vec![vec![0.0f32; target]; self.channels as usize];

        let mut written = 0usize;
        for chunk in &self.chunks {
            if written >= target {
                break;
            }
            let frames = chunk[0].len().min(target - written);
            for (ch, dest) in channels.iter_mut().enumerate() {
                dest[written..written + frames].copy_from_slice(&chunk[ch][..frames]);
            }
            written += frames;
        }

        SampleBuffer::new(self.sample_rate, channels)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_frames = 0;
    }
}

/// Copy an interleaved chunk into a fresh interleaved buffer with
/// `dst_channels`, mirroring a missing source channel and dropping
/// extras. This is the defensive-copy point for staged data.
pub(crate) fn remap_interleaved(samples: &[f32], src_channels: u16, dst_channels: u16) -> Vec<f32> {
    let src = src_channels.max(1) as usize;
    let dst = dst_channels.max(1) as usize;
    let frames = samples.len() / src;
    let mut out = Vec::with_capacity(frames * dst);
    for frame in 0..frames {
        for ch in 0..dst {
            out.push(samples[frame * src + ch.min(src - 1)]);
        }
    }
    out
}

/// Build the first capture strategy the host supports, in priority
/// order: container, low-latency, block.
///
/// Individual `PlatformUnsupported` failures are absorbed and logged;
/// only when every strategy fails does an error surface.
pub fn select_strategy(
    config: &EngineConfig,
    capabilities: HostCapabilities,
    codec: Option<Arc<dyn ChunkCodec>>,
    stream_rate: u32,
) -> Result<Box<dyn CaptureStrategy>, EngineError> {
    let candidates: Vec<Box<dyn CaptureStrategy>> = vec![
        Box::new(ContainerCapture::new(
            stream_rate,
            config.container_slice_secs,
            codec,
        )),
        Box::new(LowLatencyCapture::new(
            stream_rate,
            config.low_latency_block,
            capabilities,
        )),
        Box::new(BlockCapture::new(stream_rate, config.block_size)),
    ];

    let mut failures = Vec::new();
    for mut candidate in candidates {
        match candidate.initialize() {
            Ok(()) => {
                log::info!("selected {} capture strategy", candidate.kind());
                return Ok(candidate);
            }
            Err(EngineError::PlatformUnsupported(reason)) => {
                log::info!(
                    "{} capture unavailable ({}), trying next strategy",
                    candidate.kind(),
                    reason
                );
                failures.push(format!("{}: {}", candidate.kind(), reason));
            }
            Err(other) => return Err(other),
        }
    }

    Err(EngineError::InitializationFailure(format!(
        "no capture strategy available ({})",
        failures.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_length_comes_from_elapsed_time() {
        let mut acc = ChunkAccumulator::new(44_100, 2);
        // Deliver 1.0s worth of frames but claim 2.0s elapsed: the
        // tail stays zero-filled.
        let chunk = vec![0.5f32; 44_100 * 2];
        acc.push_interleaved(&chunk, 2);

        let buf = acc.assemble(2.0);
        assert_eq!(buf.len(), 88_200);
        assert_eq!(buf.channel(0)[44_099], 0.5);
        assert_eq!(buf.channel(0)[44_100], 0.0);
    }

    #[test]
    fn assemble_stops_early_on_overflow() {
        let mut acc = ChunkAccumulator::new(1_000, 1);
        acc.push_interleaved(&vec![0.1f32; 600], 1);
        acc.push_interleaved(&vec![0.2f32; 600], 1);

        // Target 1000 frames < 1200 delivered: the second chunk is
        // copied partially, never past the destination.
        let buf = acc.assemble(1.0);
        assert_eq!(buf.len(), 1_000);
        assert_eq!(buf.channel(0)[599], 0.1);
        assert_eq!(buf.channel(0)[600], 0.2);
        assert_eq!(buf.channel(0)[999], 0.2);
    }

    #[test]
    fn defensive_copy_isolates_host_buffer() {
        let mut acc = ChunkAccumulator::new(1_000, 1);
        let mut host_buffer = vec![0.5f32; 100];
        acc.push_interleaved(&host_buffer, 1);

        // The host reuses its buffer after the callback returns.
        for s in host_buffer.iter_mut() {
            *s = -1.0;
        }

        let buf = acc.assemble(0.1);
        assert!(buf.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn channel_count_capped_at_stereo() {
        let mut acc = ChunkAccumulator::new(1_000, 4);
        assert_eq!(acc.channels(), 2);

        // 4-channel interleaved input: channels 2 and 3 are dropped.
        let chunk = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        acc.push_interleaved(&chunk, 4);

        let buf = acc.assemble(0.002);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.channel(0), &[0.1, 0.5]);
        assert_eq!(buf.channel(1), &[0.2, 0.6]);
    }

    #[test]
    fn mono_source_mirrors_into_stereo() {
        let mut acc = ChunkAccumulator::new(1_000, 2);
        acc.push_interleaved(&[0.3, 0.4], 1);
        let buf = acc.assemble(0.002);
        assert_eq!(buf.channel(0), &[0.3, 0.4]);
        assert_eq!(buf.channel(1), &[0.3, 0.4]);
    }

    #[test]
    fn zero_chunks_is_a_valid_empty_result() {
        let acc = ChunkAccumulator::new(44_100, 2);
        let buf = acc.assemble(0.0);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.channel_count(), 2);
    }

    #[test]
    fn fallback_prefers_container_when_codec_present() {
        let strategy = select_strategy(
            &EngineConfig::default(),
            HostCapabilities {
                low_latency_processing: true,
            },
            Some(Arc::new(crate::codec::Pcm16Codec)),
            44_100,
        )
        .unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Container);
    }

    #[test]
    fn fallback_to_low_latency_without_codec() {
        let strategy = select_strategy(
            &EngineConfig::default(),
            HostCapabilities {
                low_latency_processing: true,
            },
            None,
            44_100,
        )
        .unwrap();
        assert_eq!(strategy.kind(), StrategyKind::LowLatency);
    }

    #[test]
    fn fallback_bottoms_out_at_block() {
        let strategy = select_strategy(
            &EngineConfig::default(),
            HostCapabilities::default(),
            None,
            44_100,
        )
        .unwrap();
        assert_eq!(strategy.kind(), StrategyKind::Block);
    }
}
