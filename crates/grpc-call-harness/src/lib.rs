//! gRPC Call Harness
//!
//! Host gRPC services whose handlers are written once per cardinality, and
//! drive calls against them from another process over named pipes.
//!
//! # Example
//!
//! ```rust,no_run
//! use grpc_call_harness::prelude::*;
//! use std::net::SocketAddr;
//! use tonic::Status;
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct HelloRequest {
//!     #[prost(string, tag = "1")]
//!     name: String,
//! }
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! struct HelloReply {
//!     #[prost(string, tag = "1")]
//!     message: String,
//! }
//!
//! impl ArtificialDelay for HelloRequest {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HarnessError> {
//!     let t = |name: &str| MessageType::new(name);
//!     let descriptor = ServiceDescriptor::new("greeter").with_method(MethodDefinition::new(
//!         "say_hello",
//!         false,
//!         false,
//!         t("greeter.HelloRequest"),
//!         t("greeter.HelloReply"),
//!     ));
//!
//!     let say_hello = Handler::unary_unary(|_ctx, request: HelloRequest| async move {
//!         Ok::<_, Status>(HelloReply {
//!             message: format!("Hello, {}!", request.name),
//!         })
//!     });
//!
//!     let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<SocketAddr>();
//!     let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
//!     let server = tokio::spawn(
//!         HostBuilder::new()
//!             .server(Hyper::default())
//!             .collector(DefaultCollector::new())
//!             .service(Service::new(descriptor.clone()).with_method(Method::new("say_hello", say_hello)))
//!             .build()
//!             .serve(
//!                 Some(move |addr| {
//!                     let _ = ready_tx.send(addr);
//!                 }),
//!                 async move {
//!                     let _ = stop_rx.await;
//!                 },
//!             ),
//!     );
//!
//!     let addr = ready_rx.await.unwrap();
//!     let stub = GrpcStub::connect(format!("http://{addr}"), &descriptor).await?;
//!     let reply = stub
//!         .unary("say_hello", Message::from_prost(&HelloRequest { name: "you".into() }))
//!         .await
//!         .map_err(CallError::from)?;
//!     println!("{}", reply.decode::<HelloReply>().unwrap().message);
//!
//!     let _ = stop_tx.send(());
//!     let calls = server.await.unwrap()?;
//!     assert_eq!(calls.len(), 1);
//!     Ok(())
//! }
//! ```

mod adapters;
pub mod config;
pub mod entities;
pub mod error;
pub mod use_cases;

pub use error::{HarnessError, PipeError};

pub use adapters::gateways::{FifoPipe, GrpcStub, Hyper, RawCodec, MAX_FRAME_LEN};
pub use use_cases::{CallDriver, CancelHandle, HostBuilder, Inspector, ShutdownPolicy};

/// Default collector implementation that records every completed call
pub struct DefaultCollector {
    calls: std::sync::Mutex<Vec<entities::CollectedCall>>,
}

impl DefaultCollector {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for DefaultCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl use_cases::ports::Collector for DefaultCollector {
    type Output = Vec<entities::CollectedCall>;

    fn collect(&self, call: entities::CollectedCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn into_output(self) -> Self::Output {
        self.calls.into_inner().unwrap_or_default()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::{
        ArtificialDelay, CallConfig, CallError, Cardinality, CollectedCall, Command, Handler,
        InvocationMetadata, Message, MessageStream, MessageType, Method, MethodDefinition,
        MethodDescriptor, Payload, Reply, RequestContext, RequestStream, Service,
        ServiceDefinition, ServiceDescriptor,
    };
    pub use crate::error::{HarnessError, PipeError};
    pub use crate::use_cases::ports::{Collector, Invoker, Server};
    pub use crate::use_cases::{CallDriver, CancelHandle, HostBuilder, Inspector, ShutdownPolicy};
    pub use crate::{DefaultCollector, FifoPipe, GrpcStub, Hyper};
}
