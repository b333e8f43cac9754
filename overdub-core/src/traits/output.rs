use std::sync::Arc;

use crate::models::error::EngineError;

/// Callback that fills an interleaved output buffer.
///
/// Parameters: interleaved f32 frame buffer to fill, channel count.
/// Fires on the host's render thread; the implementation must write
/// every sample (silence included) and return quickly.
pub type RenderCallback = Arc<dyn Fn(&mut [f32], u16) + Send + Sync + 'static>;

/// Host audio output (the audible destination).
pub trait AudioOutput: Send {
    /// Start the render stream, pulling audio via `callback`.
    fn start(&mut self, callback: RenderCallback) -> Result<(), EngineError>;

    /// Stop rendering. Idempotent.
    fn stop(&mut self);

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Output latency in seconds, as reported by the host.
    fn base_latency_secs(&self) -> f64;
}
