//! Error types for depthsense-fusion

use thiserror::Error;

/// Main error type for frame decoding, fusion and transport
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("JPEG error: {0}")]
    Jpeg(String),

    #[error("{what} has {actual} elements, expected {expected}")]
    FrameSize {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Failures reported by the device while configuring a node.
///
/// These are never fatal: the session logs them and carries on without the
/// affected stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("control request for {0} node was refused")]
    ControlRefused(String),

    #[error("invalid configuration for {0} node: {1}")]
    InvalidConfiguration(String, String),

    #[error("{0} node is not available")]
    NodeUnavailable(String),

    #[error("device transport failure: {0}")]
    Transport(String),
}

/// Result type alias for depthsense-fusion operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<snap::Error> for Error {
    fn from(e: snap::Error) -> Self {
        Error::Compression(e.to_string())
    }
}

impl From<turbojpeg::Error> for Error {
    fn from(e: turbojpeg::Error) -> Self {
        Error::Jpeg(e.to_string())
    }
}

impl From<zenoh::Error> for Error {
    fn from(e: zenoh::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
