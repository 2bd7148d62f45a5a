mod call;
mod cardinality;
mod execution_result;
mod handler;
mod host;
mod message;
mod metadata;
mod method;
mod service;

pub use call::{CallConfig, CallError, Command, Reply};
pub use cardinality::Cardinality;
pub use execution_result::CollectedCall;
pub use handler::{ArtificialDelay, Handler, RequestContext, RequestStream};
pub use host::Host;
pub use message::{Message, MessageStream, MessageType, Payload};
pub use metadata::{extract_metadata, InvocationMetadata, BINARY_SUFFIX};
pub use method::{Method, MethodDefinition, MethodDescriptor};
pub use service::{Service, ServiceDefinition, ServiceDescriptor};
