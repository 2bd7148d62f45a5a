use std::path::PathBuf;

use thiserror::Error;

use crate::entities::{Cardinality, CallError};

/// Errors that can occur while hosting services or driving calls
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unknown method '{method}' on service '{service}'")]
    UnknownMethod { service: String, method: String },

    #[error("method '{method}' is declared {declared:?} but its handler is {handler:?}")]
    CardinalityMismatch {
        method: String,
        declared: Cardinality,
        handler: Cardinality,
    },

    #[error("remote call failed: {0}")]
    RemoteCallFailure(#[from] CallError),

    #[error("pipe error: {0}")]
    Pipe(#[from] PipeError),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Errors raised by the named-pipe transport
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("a file already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("pipe IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed pipe payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds the pipe frame limit")]
    FrameTooLarge(usize),

    #[error("pipe closed in the middle of a frame")]
    Truncated,
}
