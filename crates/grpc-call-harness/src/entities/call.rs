use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tonic::{Code, Status};

use super::Message;

/// Directs the call driver to execute one call over a pair of named pipes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfig {
    pub method_name: String,
    pub request_pipe_path: PathBuf,
    pub response_pipe_path: PathBuf,
}

impl CallConfig {
    pub fn new(
        method_name: impl Into<String>,
        request_pipe_path: impl Into<PathBuf>,
        response_pipe_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            request_pipe_path: request_pipe_path.into(),
            response_pipe_path: response_pipe_path.into(),
        }
    }
}

/// A value read from the driver's command pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Call(CallConfig),
    Stop,
}

/// A value written to a call's response pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Message(Message),
    Error(CallError),
}

impl Reply {
    pub fn into_result(self) -> Result<Message, CallError> {
        match self {
            Reply::Message(message) => Ok(message),
            Reply::Error(error) => Err(error),
        }
    }
}

/// A remote failure marshaled across the process boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?}: {details}")]
pub struct CallError {
    #[serde(with = "code_number")]
    pub code: Code,
    pub details: String,
    pub debug_info: String,
}

impl CallError {
    pub fn new(code: Code, details: impl Into<String>) -> Self {
        let details = details.into();
        Self {
            debug_info: format!("{}: {}", code.description(), details),
            code,
            details,
        }
    }
}

impl From<&Status> for CallError {
    fn from(status: &Status) -> Self {
        Self {
            code: status.code(),
            details: status.message().to_owned(),
            debug_info: status.to_string(),
        }
    }
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        Self::from(&status)
    }
}

impl From<CallError> for Status {
    fn from(error: CallError) -> Self {
        Status::new(error.code, error.details)
    }
}

mod code_number {
    use serde::{Deserialize, Deserializer, Serializer};
    use tonic::Code;

    pub fn serialize<S: Serializer>(code: &Code, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*code as i32)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Code, D::Error> {
        i32::deserialize(deserializer).map(Code::from_i32)
    }
}
