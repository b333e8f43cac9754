/// Engine state machine.
///
/// ```text
/// Idle / Stopped → Recording → Idle
/// Idle / Stopped → Playing ↔ Paused
/// Playing → Stopped (manual stop or natural end)
/// ```
///
/// Recording is exclusive: neither a second recording nor playback
/// can start while a recording is in flight. Active playback must be
/// stopped before a recording can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Recording { track_id: u32 },
    Playing,
    Paused,
    Stopped,
}

impl EngineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Whether playback may start from this state.
    pub fn can_start_playback(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }

    /// Whether a recording may start from this state. `Stopped` counts:
    /// finishing a listen pass must not wedge the next take.
    pub fn can_start_recording(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }

    /// The track being recorded, if any.
    pub fn recording_track(&self) -> Option<u32> {
        match self {
            Self::Recording { track_id } => Some(*track_id),
            _ => None,
        }
    }
}

/// Per-capture-session phase.
///
/// Finalization (the container strategy's asynchronous decode) must
/// complete before the session's buffers may be torn down; disposal
/// requested while `Finalizing` is deferred until it finishes.
///
/// ```text
/// Idle → Recording → Finalizing → Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Recording,
    Finalizing,
}

impl SessionPhase {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_finalizing(&self) -> bool {
        matches!(self, Self::Finalizing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_start_allowed_states() {
        assert!(EngineState::Idle.can_start_playback());
        assert!(EngineState::Stopped.can_start_playback());
        assert!(!EngineState::Recording { track_id: 1 }.can_start_playback());
        assert!(!EngineState::Playing.can_start_playback());
        assert!(!EngineState::Paused.can_start_playback());
    }

    #[test]
    fn recording_start_allowed_states() {
        assert!(EngineState::Idle.can_start_recording());
        assert!(EngineState::Stopped.can_start_recording());
        assert!(!EngineState::Recording { track_id: 1 }.can_start_recording());
        assert!(!EngineState::Playing.can_start_recording());
        assert!(!EngineState::Paused.can_start_recording());
    }

    #[test]
    fn recording_track_extraction() {
        assert_eq!(EngineState::Recording { track_id: 3 }.recording_track(), Some(3));
        assert_eq!(EngineState::Idle.recording_track(), None);
    }
}
