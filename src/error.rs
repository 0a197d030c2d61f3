//! Error types for the audio bridge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The listening endpoint could not be created.
    #[error("Failed to bind socket '{path}': {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An audio device could not be opened or configured.
    #[error("Failed to open {direction} device '{device}': {source}")]
    DeviceOpen {
        device: String,
        direction: &'static str,
        #[source]
        source: alsa::Error,
    },

    /// The device was released by `close()`; callers treat this as cancellation.
    #[error("Audio device closed")]
    DeviceClosed,

    #[error("ALSA error: {0}")]
    Alsa(#[from] alsa::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
