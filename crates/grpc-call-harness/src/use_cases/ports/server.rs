use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;

use super::Collector;
use crate::entities::Service;
use crate::error::HarnessError;

/// Trait for gRPC server implementations
#[async_trait]
pub trait Server: Send + Sync + Clone {
    /// Serve the given services until `shutdown` resolves.
    ///
    /// Registrations are validated before the listener is bound.
    /// Returns the collector's output type.
    ///
    /// If `on_ready` is provided, it will be called with the actual server address
    /// once the server is ready to accept connections.
    async fn run<C, F, S>(
        &self,
        services: Vec<Service>,
        collector: C,
        on_ready: Option<F>,
        shutdown: S,
    ) -> Result<C::Output, HarnessError>
    where
        C: Collector + 'static,
        F: FnOnce(SocketAddr) + Send + 'static,
        S: Future<Output = ()> + Send + 'static;
}
