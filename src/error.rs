//! Error types for the voice relay

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio driver errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream thread did not report readiness")]
    StartTimeout,
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("Socket configuration failed: {0}")]
    SocketOption(String),

    #[error("Malformed packet: {len} bytes, header needs {needed}")]
    Malformed { len: usize, needed: usize },
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Operation `{op}` is not valid in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: crate::session::SessionState,
    },

    #[error("Client mode requires a remote address")]
    MissingRemote,

    #[error("Mode requires a {0}")]
    MissingBackend(&'static str),

    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
