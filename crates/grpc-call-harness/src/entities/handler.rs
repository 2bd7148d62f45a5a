use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, Fuse, Stream, StreamExt};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::Status;

use super::{Cardinality, InvocationMetadata, Message, MessageStream, Payload};

/// Context passed to every handler invocation.
///
/// Metadata is extracted once per call, not per streamed item.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub service: String,
    pub method: String,
    pub cardinality: Cardinality,
    pub metadata: InvocationMetadata,
}

impl RequestContext {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        cardinality: Cardinality,
        metadata: InvocationMetadata,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            cardinality,
            metadata,
        }
    }

    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

/// Request types that may ask the handler adapter to simulate latency
pub trait ArtificialDelay {
    fn delay(&self) -> Option<Duration> {
        None
    }
}

/// Lazily decoded request sequence handed to streaming-request handlers
pub type RequestStream<T> = BoxStream<'static, Result<T, Status>>;

type UnaryFn =
    Arc<dyn Fn(RequestContext, Message) -> BoxFuture<'static, Result<Message, Status>> + Send + Sync>;
type ServerStreamingFn = Arc<
    dyn Fn(RequestContext, Message) -> BoxFuture<'static, Result<MessageStream, Status>> + Send + Sync,
>;
type ClientStreamingFn = Arc<
    dyn Fn(RequestContext, MessageStream) -> BoxFuture<'static, Result<Message, Status>> + Send + Sync,
>;
type StreamingFn = Arc<
    dyn Fn(RequestContext, MessageStream) -> BoxFuture<'static, Result<MessageStream, Status>>
        + Send
        + Sync,
>;

/// A handler for one of the four call shapes, erased over encoded messages
#[derive(Clone)]
pub enum Handler {
    UnaryUnary(UnaryFn),
    UnaryStream(ServerStreamingFn),
    StreamUnary(ClientStreamingFn),
    StreamStream(StreamingFn),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler").field(&self.cardinality()).finish()
    }
}

impl Handler {
    /// One request in, one response out
    pub fn unary_unary<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: prost::Message + Default + ArtificialDelay + 'static,
        Resp: prost::Message + 'static,
        F: Fn(RequestContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        Handler::UnaryUnary(Arc::new(move |ctx: RequestContext, message: Message| {
            let f = f.clone();
            async move {
                let request: Req = decode(&message)?;
                pause(request.delay()).await;
                let response = f(ctx, request).await?;
                Ok::<_, Status>(Message::from_prost(&response))
            }
            .boxed()
        }))
    }

    /// One request in, a sequence of responses out.
    ///
    /// The request's delay is applied before each response is forwarded.
    pub fn unary_stream<Req, Resp, F, S>(f: F) -> Self
    where
        Req: prost::Message + Default + ArtificialDelay + 'static,
        Resp: prost::Message + 'static,
        F: Fn(RequestContext, Req) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        Handler::UnaryStream(Arc::new(move |ctx: RequestContext, message: Message| {
            let f = f.clone();
            async move {
                let request: Req = decode(&message)?;
                let delay = request.delay();
                let responses = f(ctx, request).then(move |item| async move {
                    pause(delay).await;
                    item.map(|response| Message::from_prost(&response))
                });
                Ok::<MessageStream, Status>(responses.boxed())
            }
            .boxed()
        }))
    }

    /// A sequence of requests in, one response out.
    ///
    /// Requests the handler leaves unread are drained before the response
    /// is returned; a failure among them aborts the call.
    pub fn stream_unary<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: prost::Message + Default + ArtificialDelay + 'static,
        Resp: prost::Message + 'static,
        F: Fn(RequestContext, RequestStream<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        Handler::StreamUnary(Arc::new(move |ctx: RequestContext, messages: MessageStream| {
            let f = f.clone();
            async move {
                let source = Arc::new(Mutex::new(messages.fuse()));
                let response = f(ctx, decode_stream(shared(source.clone()))).await?;
                let mut rest = source.lock().await;
                while let Some(item) = rest.next().await {
                    item?;
                }
                Ok::<_, Status>(Message::from_prost(&response))
            }
            .boxed()
        }))
    }

    /// A sequence of requests in, a sequence of responses out.
    ///
    /// Neither side is materialized; the handler decides how consumption and
    /// production interleave.
    pub fn stream_stream<Req, Resp, F, S>(f: F) -> Self
    where
        Req: prost::Message + Default + ArtificialDelay + 'static,
        Resp: prost::Message + 'static,
        F: Fn(RequestContext, RequestStream<Req>) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        Handler::StreamStream(Arc::new(move |ctx: RequestContext, messages: MessageStream| {
            let f = f.clone();
            async move {
                let responses = f(ctx, decode_stream(messages))
                    .map(|item| item.map(|response| Message::from_prost(&response)));
                Ok::<MessageStream, Status>(responses.boxed())
            }
            .boxed()
        }))
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Handler::UnaryUnary(_) => Cardinality::UnaryUnary,
            Handler::UnaryStream(_) => Cardinality::UnaryStream,
            Handler::StreamUnary(_) => Cardinality::StreamUnary,
            Handler::StreamStream(_) => Cardinality::StreamStream,
        }
    }

    /// Invoke the handler uniformly, whatever its shape.
    ///
    /// Unary-request handlers take exactly one message from `requests`.
    /// The result is `Payload::Single` for unary-response handlers and
    /// `Payload::Sequence` otherwise.
    pub async fn invoke(
        &self,
        ctx: RequestContext,
        requests: MessageStream,
    ) -> Result<Payload, Status> {
        match self {
            Handler::UnaryUnary(f) => {
                let request = single_request(requests).await?;
                f(ctx, request).await.map(Payload::Single)
            }
            Handler::UnaryStream(f) => {
                let request = single_request(requests).await?;
                f(ctx, request).await.map(Payload::Sequence)
            }
            Handler::StreamUnary(f) => f(ctx, requests).await.map(Payload::Single),
            Handler::StreamStream(f) => f(ctx, requests).await.map(Payload::Sequence),
        }
    }
}

async fn single_request(mut requests: MessageStream) -> Result<Message, Status> {
    let request = match requests.next().await {
        Some(request) => request?,
        None => return Err(Status::internal("missing request message")),
    };
    if requests.next().await.is_some() {
        return Err(Status::unimplemented(
            "expected exactly one request message for a unary request",
        ));
    }
    Ok(request)
}

fn decode<T: prost::Message + Default>(message: &Message) -> Result<T, Status> {
    message
        .decode()
        .map_err(|err| Status::internal(format!("failed to decode request: {err}")))
}

/// A view of `source` that leaves whatever it does not pull to the owner
fn shared(source: Arc<Mutex<Fuse<MessageStream>>>) -> MessageStream {
    stream::unfold(source, |source| async move {
        let item = source.lock().await.next().await;
        item.map(|item| (item, source))
    })
    .boxed()
}

/// Each item's own delay is applied before it reaches the handler
fn decode_stream<T>(messages: MessageStream) -> RequestStream<T>
where
    T: prost::Message + Default + ArtificialDelay + 'static,
{
    messages
        .then(|item| async move {
            let request: T = decode(&item?)?;
            pause(request.delay()).await;
            Ok::<T, Status>(request)
        })
        .boxed()
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay.filter(|d| !d.is_zero()) {
        tokio::time::sleep(delay).await;
    }
}
