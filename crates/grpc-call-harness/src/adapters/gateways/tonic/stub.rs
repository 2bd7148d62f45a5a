use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http::uri::PathAndQuery;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::entities::{Cardinality, Message, MessageStream, Payload, ServiceDescriptor};
use crate::error::HarnessError;
use crate::use_cases::ports::Invoker;
use crate::use_cases::Inspector;

/// Pass-through codec: messages are already protobuf-encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// Client handle exposing every method of a service by name.
///
/// Cloning is cheap; clones share the underlying channel, which multiplexes
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct GrpcStub {
    channel: Channel,
    inspector: Inspector,
}

impl GrpcStub {
    pub fn new(channel: Channel, inspector: Inspector) -> Self {
        Self { channel, inspector }
    }

    /// Connect to `endpoint` (e.g. `http://127.0.0.1:50051`)
    pub async fn connect(
        endpoint: impl Into<String>,
        descriptor: &ServiceDescriptor,
    ) -> Result<Self, HarnessError> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| HarnessError::ConfigurationError(format!("invalid endpoint {endpoint}: {e}")))?
            .connect()
            .await?;
        tracing::debug!(%endpoint, service = %descriptor.name, "channel connected");
        Ok(Self::new(channel, Inspector::new(descriptor)))
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    pub async fn unary(&self, method: &str, request: Message) -> Result<Message, Status> {
        let (mut grpc, path) = self.prepare(method, Cardinality::UnaryUnary).await?;
        let response = grpc
            .unary(Request::new(Bytes::from(request.data)), path, RawCodec)
            .await?;
        Ok(Message::from(response.into_inner()))
    }

    pub async fn server_streaming(
        &self,
        method: &str,
        request: Message,
    ) -> Result<MessageStream, Status> {
        let (mut grpc, path) = self.prepare(method, Cardinality::UnaryStream).await?;
        let response = grpc
            .server_streaming(Request::new(Bytes::from(request.data)), path, RawCodec)
            .await?;
        Ok(response
            .into_inner()
            .map(|item| item.map(Message::from))
            .boxed())
    }

    pub async fn client_streaming<S>(&self, method: &str, requests: S) -> Result<Message, Status>
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        let (mut grpc, path) = self.prepare(method, Cardinality::StreamUnary).await?;
        let requests = requests.map(|message| Bytes::from(message.data));
        let response = grpc
            .client_streaming(Request::new(requests), path, RawCodec)
            .await?;
        Ok(Message::from(response.into_inner()))
    }

    pub async fn streaming<S>(&self, method: &str, requests: S) -> Result<MessageStream, Status>
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        let (mut grpc, path) = self.prepare(method, Cardinality::StreamStream).await?;
        let requests = requests.map(|message| Bytes::from(message.data));
        let response = grpc.streaming(Request::new(requests), path, RawCodec).await?;
        Ok(response
            .into_inner()
            .map(|item| item.map(Message::from))
            .boxed())
    }

    /// Call any method, choosing the call style from its declared cardinality.
    ///
    /// Unary-request methods send only the first message of `requests`; an
    /// empty `requests` fails locally with `FAILED_PRECONDITION` and nothing
    /// reaches the server.
    pub async fn call<S>(&self, method: &str, requests: S) -> Result<Payload, Status>
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        let cardinality = self
            .inspector
            .cardinality_for_method(method)
            .map_err(|e| Status::unimplemented(e.to_string()))?;

        if cardinality.request_streaming() {
            match cardinality {
                Cardinality::StreamUnary => self.client_streaming(method, requests).await.map(Payload::Single),
                _ => self.streaming(method, requests).await.map(Payload::Sequence),
            }
        } else {
            let mut requests = Box::pin(requests);
            let request = requests
                .next()
                .await
                .ok_or_else(|| Status::failed_precondition("no request sent: the request stream was empty"))?;
            match cardinality {
                Cardinality::UnaryUnary => self.unary(method, request).await.map(Payload::Single),
                _ => self.server_streaming(method, request).await.map(Payload::Sequence),
            }
        }
    }

    async fn prepare(
        &self,
        method: &str,
        expected: Cardinality,
    ) -> Result<(tonic::client::Grpc<Channel>, PathAndQuery), Status> {
        let descriptor = self
            .inspector
            .describe(method)
            .map_err(|e| Status::unimplemented(e.to_string()))?;
        if descriptor.cardinality != expected {
            return Err(Status::internal(format!(
                "{} is {:?}, not {:?}",
                descriptor.path, descriptor.cardinality, expected
            )));
        }
        let path = PathAndQuery::try_from(descriptor.path.as_str())
            .map_err(|e| Status::internal(format!("invalid method path {}: {e}", descriptor.path)))?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("channel not ready: {e}")))?;
        Ok((grpc, path))
    }
}

#[async_trait]
impl Invoker for GrpcStub {
    fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    async fn invoke(
        &self,
        method: &str,
        requests: BoxStream<'static, Message>,
    ) -> Result<Payload, Status> {
        self.call(method, requests).await
    }
}
