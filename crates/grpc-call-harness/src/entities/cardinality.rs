use serde::{Deserialize, Serialize};

/// The four request/response shapes a gRPC call can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    UnaryUnary,
    UnaryStream,
    StreamUnary,
    StreamStream,
}

impl Cardinality {
    pub const ALL: [Cardinality; 4] = [
        Cardinality::UnaryUnary,
        Cardinality::UnaryStream,
        Cardinality::StreamUnary,
        Cardinality::StreamStream,
    ];

    /// Classify a method from its request-streaming and response-streaming flags
    pub fn from_streaming(request_streaming: bool, response_streaming: bool) -> Self {
        match (request_streaming, response_streaming) {
            (false, false) => Cardinality::UnaryUnary,
            (false, true) => Cardinality::UnaryStream,
            (true, false) => Cardinality::StreamUnary,
            (true, true) => Cardinality::StreamStream,
        }
    }

    pub fn request_streaming(self) -> bool {
        matches!(self, Cardinality::StreamUnary | Cardinality::StreamStream)
    }

    pub fn response_streaming(self) -> bool {
        matches!(self, Cardinality::UnaryStream | Cardinality::StreamStream)
    }
}
