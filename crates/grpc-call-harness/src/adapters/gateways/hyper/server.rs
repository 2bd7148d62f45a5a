use async_trait::async_trait;
use futures::StreamExt;
use http_body_util::StreamBody;
use hyper::body::{Bytes, Frame, Incoming};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Status};

use super::frame::{decode_body, encode_frame};
use crate::entities::{
    CollectedCall, Handler, InvocationMetadata, MethodDescriptor, Payload, RequestContext, Service,
};
use crate::error::HarnessError;
use crate::use_cases::ports::{Collector, Server};
use crate::use_cases::Inspector;

type GrpcBody = StreamBody<ReceiverStream<Result<Frame<Bytes>, Infallible>>>;

/// HTTP/2 gRPC server hosting cardinality-generic handlers
#[derive(Clone)]
pub struct Hyper {
    addr: SocketAddr,
}

impl Hyper {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn bind(addr: impl Into<SocketAddr>) -> Self {
        Self::new(addr.into())
    }
}

impl Default for Hyper {
    fn default() -> Self {
        Self::new(([127, 0, 0, 1], 0).into())
    }
}

/// Type-erased collector trait for internal use
trait ErasedCollector: Send + Sync {
    fn collect(&self, call: CollectedCall);
}

impl<C: Collector> ErasedCollector for std::sync::Mutex<Option<C>> {
    fn collect(&self, call: CollectedCall) {
        if let Ok(guard) = self.lock() {
            if let Some(ref collector) = *guard {
                collector.collect(call);
            }
        }
    }
}

/// State shared with handlers
struct ServerState {
    /// Map from "/service/method" to its route
    routes: HashMap<String, Arc<RouteState>>,
    collector: Arc<dyn ErasedCollector>,
}

struct RouteState {
    service_name: String,
    descriptor: MethodDescriptor,
    /// `None` for declared methods nobody registered a handler for
    handler: Option<Handler>,
}

impl ServerState {
    /// Build the routing table, rejecting registrations that contradict their descriptors
    fn new(services: Vec<Service>, collector: Arc<dyn ErasedCollector>) -> Result<Self, HarnessError> {
        let mut routes = HashMap::new();

        for service in services {
            let inspector = Inspector::new(&service.descriptor);
            let mut handlers = HashMap::new();

            for method in service.methods {
                let descriptor = inspector.describe(&method.name)?;
                let handler_cardinality = method.handler.cardinality();
                if descriptor.cardinality != handler_cardinality {
                    return Err(HarnessError::CardinalityMismatch {
                        method: descriptor.path.clone(),
                        declared: descriptor.cardinality,
                        handler: handler_cardinality,
                    });
                }
                handlers.insert(method.name, method.handler);
            }

            for descriptor in inspector.methods() {
                routes.insert(
                    descriptor.path.clone(),
                    Arc::new(RouteState {
                        service_name: inspector.service_name().to_owned(),
                        descriptor: descriptor.clone(),
                        handler: handlers.remove(&descriptor.name),
                    }),
                );
            }
        }

        Ok(Self { routes, collector })
    }
}

fn grpc_response(rx: mpsc::Receiver<Result<Frame<Bytes>, Infallible>>) -> Response<GrpcBody> {
    let mut response = Response::new(StreamBody::new(ReceiverStream::new(rx)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}

/// Bytes of `grpc-message` that go out percent-encoded: controls, non-ASCII and `%` itself
const GRPC_MESSAGE_ENCODE: &AsciiSet = &CONTROLS.add(b'%');

fn status_trailers(status: &Status) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    trailers.insert("grpc-status", HeaderValue::from(status.code() as i32));
    if !status.message().is_empty() {
        let encoded = utf8_percent_encode(status.message(), GRPC_MESSAGE_ENCODE).to_string();
        match HeaderValue::from_str(&encoded) {
            Ok(value) => {
                trailers.insert("grpc-message", value);
            }
            Err(err) => tracing::debug!(error = %err, "status message not representable as a header"),
        }
    }
    trailers
}

/// Answer with no messages, only the status trailers
fn status_only(status: Status) -> Response<GrpcBody> {
    let (tx, rx) = mpsc::channel(1);
    // The receiver is alive and the channel empty, so this cannot fail.
    let _ = tx.try_send(Ok(Frame::trailers(status_trailers(&status))));
    grpc_response(rx)
}

async fn handle_grpc_request(
    state: Arc<ServerState>,
    req: Request<Incoming>,
) -> Result<Response<GrpcBody>, Infallible> {
    let path = req.uri().path().to_string();

    let Some(route) = state.routes.get(&path).cloned() else {
        tracing::debug!(%path, "no such method");
        return Ok(status_only(Status::unimplemented(format!("Method not found: {path}"))));
    };
    let Some(handler) = route.handler.clone() else {
        tracing::debug!(%path, "method has no handler");
        return Ok(status_only(Status::unimplemented(format!("Method not implemented: {path}"))));
    };

    let ctx = RequestContext::new(
        route.service_name.clone(),
        route.descriptor.name.clone(),
        route.descriptor.cardinality,
        InvocationMetadata::from_headers(req.headers()),
    );

    // A bounded channel keeps the handler from running ahead of the client.
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(run_call(state, handler, ctx, req.into_body(), tx));

    Ok(grpc_response(rx))
}

/// Drive one call to completion and report it as a single unit of work
async fn run_call(
    state: Arc<ServerState>,
    handler: Handler,
    ctx: RequestContext,
    body: Incoming,
    tx: mpsc::Sender<Result<Frame<Bytes>, Infallible>>,
) {
    let started = Instant::now();
    let requests_seen = Arc::new(AtomicUsize::new(0));
    let counter = requests_seen.clone();
    let requests = decode_body(body)
        .inspect(move |item| {
            if item.is_ok() {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        })
        .boxed();

    let mut responses = 0;
    let status = match handler.invoke(ctx.clone(), requests).await {
        Ok(Payload::Single(message)) => {
            if tx.send(Ok(Frame::data(encode_frame(&message)))).await.is_ok() {
                responses += 1;
                Status::new(Code::Ok, "")
            } else {
                Status::cancelled("client went away")
            }
        }
        Ok(Payload::Sequence(mut messages)) => loop {
            match messages.next().await {
                Some(Ok(message)) => {
                    if tx.send(Ok(Frame::data(encode_frame(&message)))).await.is_err() {
                        break Status::cancelled("client went away");
                    }
                    responses += 1;
                }
                Some(Err(status)) => break status,
                None => break Status::new(Code::Ok, ""),
            }
        },
        Err(status) => status,
    };

    if status.code() == Code::Ok {
        tracing::debug!(path = %ctx.path(), responses, "call completed");
    } else {
        tracing::warn!(path = %ctx.path(), code = ?status.code(), details = status.message(), "call failed");
    }

    // Must happen before the trailers end the call on the client side.
    state.collector.collect(CollectedCall {
        service: ctx.service,
        method: ctx.method,
        cardinality: ctx.cardinality,
        metadata: ctx.metadata,
        requests: requests_seen.load(Ordering::Relaxed),
        responses,
        code: status.code(),
        elapsed: started.elapsed(),
    });

    let _ = tx.send(Ok(Frame::trailers(status_trailers(&status)))).await;
}

#[async_trait]
impl Server for Hyper {
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
        S: Future<Output = ()> + Send + 'static,
    {
        // Wrap collector in Mutex<Option<C>> so we can take it out at the end
        let collector_holder: Arc<std::sync::Mutex<Option<C>>> =
            Arc::new(std::sync::Mutex::new(Some(collector)));
        let erased_collector: Arc<dyn ErasedCollector> = collector_holder.clone();

        let state = Arc::new(ServerState::new(services, erased_collector)?);

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;

        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;

        tracing::info!(%addr, routes = state.routes.len(), "gRPC server listening");

        // Call the on_ready callback if provided
        if let Some(callback) = on_ready {
            callback(addr);
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "accepted connection");
                            let state = state.clone();
                            let io = TokioIo::new(stream);

                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let state = state.clone();
                                    async move { handle_grpc_request(state, req).await }
                                });

                                if let Err(err) = http2::Builder::new(TokioExecutor::new())
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::debug!(%peer, error = %err, "connection closed with error");
                                }
                            });
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to accept connection"),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(%addr, "gRPC server shutting down");
                    break;
                }
            }
        }

        // Extract the collector and return its output
        let collector = collector_holder
            .lock()
            .map_err(|e| HarnessError::ServerError(e.to_string()))?
            .take()
            .ok_or_else(|| HarnessError::ServerError("Collector already taken".to_string()))?;

        Ok(collector.into_output())
    }
}
