use std::future::Future;
use std::net::SocketAddr;

use crate::entities::{Host, Service};
use crate::error::HarnessError;
use crate::use_cases::ports::{Collector, Server};

/// Builder for hosting services with a fluent API
///
/// # Example
///
/// ```rust,no_run
/// use grpc_call_harness::prelude::*;
///
/// # fn greeter() -> ServiceDescriptor { ServiceDescriptor::new("greeter") }
/// #[tokio::main]
/// async fn main() -> Result<(), HarnessError> {
///     let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
///
///     let server = tokio::spawn(
///         HostBuilder::new()
///             .server(Hyper::bind(([127, 0, 0, 1], 50051)))
///             .collector(DefaultCollector::new())
///             .service(Service::new(greeter()))
///             .build()
///             .serve(None::<fn(std::net::SocketAddr)>, async move {
///                 let _ = stop_rx.await;
///             }),
///     );
///
///     // ... make gRPC calls ...
///
///     let _ = stop_tx.send(());
///     let calls = server.await.unwrap()?;
///     println!("served {} calls", calls.len());
///     Ok(())
/// }
/// ```
pub struct HostBuilder<S, C> {
    server: Option<S>,
    collector: Option<C>,
    services: Vec<Service>,
}

impl HostBuilder<(), ()> {
    /// Create a new host builder
    pub fn new() -> Self {
        Self {
            server: None,
            collector: None,
            services: Vec::new(),
        }
    }
}

impl Default for HostBuilder<(), ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> HostBuilder<S, C> {
    /// Set the server implementation to use
    pub fn server<NewS: Server>(self, server: NewS) -> HostBuilder<NewS, C> {
        HostBuilder {
            server: Some(server),
            collector: self.collector,
            services: self.services,
        }
    }

    /// Set the collector to use
    pub fn collector<NewC: Collector>(self, collector: NewC) -> HostBuilder<S, NewC> {
        HostBuilder {
            server: self.server,
            collector: Some(collector),
            services: self.services,
        }
    }

    /// Add a service to the host
    pub fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Add multiple services to the host
    pub fn services(mut self, services: impl IntoIterator<Item = Service>) -> Self {
        self.services.extend(services);
        self
    }
}

impl<S: Server + 'static, C: Collector + 'static> HostBuilder<S, C> {
    /// Build the host.
    ///
    /// Returns a configuration error when no server or collector was set.
    pub fn try_build(self) -> Result<Host<S, C>, HarnessError> {
        let server = self
            .server
            .ok_or_else(|| HarnessError::ConfigurationError("server must be set".to_string()))?;
        let collector = self
            .collector
            .ok_or_else(|| HarnessError::ConfigurationError("collector must be set".to_string()))?;
        Ok(Host {
            server,
            collector,
            services: self.services,
        })
    }

    /// Build the host
    pub fn build(self) -> Host<S, C> {
        Host {
            server: self.server.expect("Server must be set before building"),
            collector: self.collector.expect("Collector must be set before building"),
            services: self.services,
        }
    }
}

impl<S: Server + 'static, C: Collector + 'static> Host<S, C> {
    /// Serve until `shutdown` resolves.
    ///
    /// Returns the collector's output type.
    pub async fn serve<F, Sh>(self, on_ready: Option<F>, shutdown: Sh) -> Result<C::Output, HarnessError>
    where
        F: FnOnce(SocketAddr) + Send + 'static,
        Sh: Future<Output = ()> + Send + 'static,
    {
        self.server
            .run(self.services, self.collector, on_ready, shutdown)
            .await
    }
}
