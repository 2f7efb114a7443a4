//! Error types for the decoding framework.

use thiserror::Error;

/// Failure reported by the codec engine, carrying its native error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct EngineError {
    /// Native error code as reported by the engine (negative on FFmpeg).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl EngineError {
    /// Code used when the engine does not expose a numeric error.
    pub const UNKNOWN: i32 = -1;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN, message)
    }
}

/// Main error type of the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Codec engine failure (open, stream selection, seek, decode).
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// A consumer asked for an item while the buffer was empty.
    #[error("No decoded item available")]
    NoItemAvailable,

    /// The background decoder is not running.
    #[error("Decoder is not running")]
    NotRunning,

    /// `start` was called on a decoder that already left the idle state.
    #[error("Decoder was already started")]
    AlreadyStarted,

    /// No stream of the requested kind exists in the source.
    #[error("No {0} stream found")]
    NoStream(crate::media::MediaKind),

    /// Frame geometry is not usable for the requested operation.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The scaler cannot convert between the given pixel layouts.
    #[error("Unsupported conversion from {from} to {to}")]
    UnsupportedConversion {
        from: crate::media::PixelLayout,
        to: crate::media::PixelLayout,
    },

    /// The resource was already released.
    #[error("Resource already closed")]
    Closed,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Native code of an engine failure, if this error came from the engine.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            Error::Engine(e) => Some(e.code),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display_carries_code() {
        let err = Error::from(EngineError::new(-22, "Invalid argument"));
        assert_eq!(err.to_string(), "Engine error: Invalid argument (code -22)");
        assert_eq!(err.engine_code(), Some(-22));
        assert_eq!(Error::NotRunning.engine_code(), None);
    }
}
