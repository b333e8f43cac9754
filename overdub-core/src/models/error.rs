use thiserror::Error;

/// Errors that can occur in the recording engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("audio subsystem initialization failed: {0}")]
    InitializationFailure(String),

    #[error("engine not initialized")]
    NotInitialized,

    #[error("permission denied")]
    PermissionDenied,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("a recording is already in progress")]
    RecordingInProgress,

    #[error("a playback session is active")]
    PlaybackInProgress,

    #[error("capture strategy is already recording")]
    AlreadyRecording,

    #[error("capture strategy unsupported on this host: {0}")]
    PlatformUnsupported(String),

    #[error("decode failed: {0}")]
    DecodeFailure(String),

    #[error("no such track: {0}")]
    InvalidTrack(u32),

    #[error("no track has a buffer to play")]
    NoPlayableTracks,

    #[error("host backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(EngineError::NotInitialized.to_string(), "engine not initialized");
        assert_eq!(
            EngineError::InvalidTrack(7).to_string(),
            "no such track: 7"
        );
        assert_eq!(
            EngineError::DecodeFailure("bad magic".into()).to_string(),
            "decode failed: bad magic"
        );
    }
}
