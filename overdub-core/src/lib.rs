//! # overdub-core
//!
//! Platform-agnostic multi-track audio recorder core library.
//!
//! Provides capture strategies with automatic fallback, node-graph
//! mixing with solo/mute resolution, level metering, synchronized
//! playback, and engine orchestration. Platform backends implement
//! the `InputDeviceProvider` and `AudioOutput` traits and plug into
//! the generic `RecordingEngine`.
//!
//! ## Architecture
//!
//! ```text
//! overdub-core (this crate)
//! ├── traits/    ← InputDeviceProvider, InputStream, AudioOutput, EngineObserver
//! ├── models/    ← EngineError, EngineState, EngineConfig, Track, SampleBuffer, levels
//! ├── codec/     ← ChunkCodec, Pcm16Codec
//! ├── capture/   ← ContainerCapture, LowLatencyCapture, BlockCapture, fallback selection
//! ├── graph/     ← MixGraph (gain/pan nodes, analysis taps, solo/mute resolution)
//! ├── monitor/   ← LevelMonitor (metering tick loop)
//! ├── playback/  ← PlaybackCoordinator (multi-voice synchronized playback)
//! └── engine/    ← RecordingEngine (generic orchestrator)
//! ```

pub mod capture;
pub mod codec;
pub mod engine;
pub mod graph;
pub mod models;
pub mod monitor;
pub mod playback;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use capture::{CaptureStrategy, InputRouting, StrategyKind};
pub use codec::{ChunkCodec, DecodedAudio, Pcm16Codec};
pub use engine::RecordingEngine;
pub use graph::MixGraph;
pub use models::config::EngineConfig;
pub use models::error::EngineError;
pub use models::levels::{EngineInfo, LevelReading, LevelSnapshot};
pub use models::sample_buffer::{RecordingInfo, SampleBuffer};
pub use models::state::EngineState;
pub use models::track::{Track, TrackSnapshot};
pub use monitor::LevelMonitor;
pub use playback::{PlaybackCoordinator, PlaybackOptions};
pub use traits::input::{
    ChunkCallback, HostCapabilities, InputDevice, InputDeviceProvider, InputStream,
    StreamConstraints,
};
pub use traits::observer::{EngineObserver, ObserverToken};
pub use traits::output::{AudioOutput, RenderCallback};
