use serde::{Deserialize, Serialize};

use super::{Cardinality, Handler, MessageType};

/// Static metadata for one method, as emitted by the service compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDefinition {
    pub name: String,
    #[serde(default)]
    pub client_streaming: bool,
    #[serde(default)]
    pub server_streaming: bool,
    pub input_type: MessageType,
    pub output_type: MessageType,
}

impl MethodDefinition {
    pub fn new(
        name: impl Into<String>,
        client_streaming: bool,
        server_streaming: bool,
        input_type: MessageType,
        output_type: MessageType,
    ) -> Self {
        Self {
            name: name.into(),
            client_streaming,
            server_streaming,
            input_type,
            output_type,
        }
    }

    /// Build a definition from generated request/response types
    pub fn typed<Req: prost::Name, Resp: prost::Name>(
        name: impl Into<String>,
        client_streaming: bool,
        server_streaming: bool,
    ) -> Self {
        Self::new(
            name,
            client_streaming,
            server_streaming,
            MessageType::of::<Req>(),
            MessageType::of::<Resp>(),
        )
    }
}

/// Everything needed to route and dispatch a method, derived once from its definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub path: String,
    pub cardinality: Cardinality,
    pub request_type: MessageType,
    pub response_type: MessageType,
}

impl MethodDescriptor {
    pub fn from_definition(service: &str, definition: &MethodDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            path: format!("/{}/{}", service, definition.name),
            cardinality: Cardinality::from_streaming(
                definition.client_streaming,
                definition.server_streaming,
            ),
            request_type: definition.input_type.clone(),
            response_type: definition.output_type.clone(),
        }
    }
}

/// A handler registered for one method of a hosted service
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub handler: Handler,
}

impl Method {
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}
