//! # overdub-cpal
//!
//! cpal backend for overdub.
//!
//! Provides:
//! - `CpalDeviceProvider` — input device enumeration and stream acquisition
//! - `CpalInputStream` — capture stream on a dedicated thread
//! - `CpalOutput` — render stream on a dedicated thread
//!
//! A cpal `Stream` is not `Send`, so every stream is built, played,
//! and dropped on one named thread controlled through an atomic flag.
//!
//! ## Usage
//! ```ignore
//! use overdub_cpal::build_engine;
//! use overdub_core::EngineConfig;
//!
//! let engine = build_engine(EngineConfig::default()).unwrap();
//! engine.initialize().unwrap();
//! engine.start_recording(1, None).unwrap();
//! ```

pub mod devices;
pub mod input;
pub mod output;

use std::sync::Arc;

use thiserror::Error;

use overdub_core::{EngineConfig, EngineError, Pcm16Codec, RecordingEngine};

pub use devices::CpalDeviceProvider;
pub use input::CpalInputStream;
pub use output::CpalOutput;

/// Host-level failures, mapped onto [`EngineError`] at the crate
/// boundary.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no default {0} device")]
    NoDefaultDevice(&'static str),

    #[error("device enumeration failed: {0}")]
    Enumeration(String),

    #[error("stream build failed: {0}")]
    BuildStream(String),

    #[error("stream start failed: {0}")]
    PlayStream(String),
}

impl From<HostError> for EngineError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NoDefaultDevice(kind) => EngineError::DeviceNotFound(format!("default {}", kind)),
            other => EngineError::Backend(other.to_string()),
        }
    }
}

/// Build a [`RecordingEngine`] wired to the default cpal host, using
/// the PCM16 chunk codec.
pub fn build_engine(config: EngineConfig) -> Result<RecordingEngine, EngineError> {
    let provider = Arc::new(CpalDeviceProvider::new());
    let output = Box::new(CpalOutput::new(config.sample_rate)?);
    Ok(RecordingEngine::new(
        config,
        provider,
        output,
        Some(Arc::new(Pcm16Codec)),
    ))
}
