use crate::models::error::EngineError;
use crate::models::levels::{EngineInfo, LevelSnapshot};
use crate::models::state::EngineState;

/// Event surface exposed to the UI layer.
///
/// All methods are called from engine-internal threads (capture,
/// render, monitor), not the caller's thread; implementations should
/// marshal to the UI thread if needed. Every method defaults to a
/// no-op so observers implement only the events they care about.
#[allow(unused_variables)]
pub trait EngineObserver: Send + Sync {
    fn on_state_changed(&self, state: EngineState) {}

    fn on_recording_progress(&self, track_id: u32, elapsed_secs: f64) {}

    fn on_recording_complete(&self, track_id: u32, duration_secs: f64) {}

    fn on_playback_progress(&self, elapsed_secs: f64) {}

    fn on_playback_finished(&self) {}

    fn on_levels_updated(&self, snapshot: &LevelSnapshot) {}

    fn on_error(&self, error: &EngineError) {}

    fn on_initialized(&self, info: &EngineInfo) {}
}

/// Handle returned by `RecordingEngine::add_observer`, used to
/// unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub(crate) u64);
