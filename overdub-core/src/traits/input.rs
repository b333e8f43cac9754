use std::sync::Arc;

use crate::models::error::EngineError;

/// Callback invoked when the host delivers a chunk of input audio.
///
/// Parameters: interleaved f32 samples, sample rate of the delivered
/// audio, channel count. The slice is owned by the host and is only
/// valid for the duration of the call; consumers must copy out of it
/// before returning. It fires on a dedicated audio thread; keep
/// processing minimal.
pub type ChunkCallback = Arc<dyn Fn(&[f32], u32, u16) + Send + Sync + 'static>;

/// Constraints applied when acquiring an input stream.
///
/// The processing switches default to off: echo cancellation, noise
/// suppression, and auto gain all degrade raw signal fidelity, which
/// a recorder wants to keep.
#[derive(Debug, Clone)]
pub struct StreamConstraints {
    pub device_id: Option<String>,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl StreamConstraints {
    pub fn raw(device_id: Option<String>, channel_count: u16, sample_rate: u32) -> Self {
        Self {
            device_id,
            channel_count,
            sample_rate,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}

/// An input device as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// What the host is capable of; drives capture-strategy selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilities {
    /// Whether the host can deliver small fixed-size blocks with
    /// low round-trip latency.
    pub low_latency_processing: bool,
}

/// A live input stream handle.
///
/// Exclusively owned by at most one capture session at a time.
/// Dropping the stream must release the device.
pub trait InputStream: Send {
    /// Begin delivering chunks via `callback`.
    fn start(&mut self, callback: ChunkCallback) -> Result<(), EngineError>;

    /// Stop delivery and release the device. Idempotent.
    fn stop(&mut self);

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;
}

/// Host input-device subsystem.
pub trait InputDeviceProvider: Send + Sync {
    /// Enumerate input devices available for capture.
    fn list_devices(&self) -> Result<Vec<InputDevice>, EngineError>;

    /// Acquire a live stream for the constrained device.
    ///
    /// Fails with `PermissionDenied` when the host refuses access and
    /// `DeviceNotFound` when the id does not resolve.
    fn acquire(&self, constraints: &StreamConstraints) -> Result<Box<dyn InputStream>, EngineError>;

    /// Host capability probe.
    fn capabilities(&self) -> HostCapabilities;
}
