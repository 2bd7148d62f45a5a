//! gRPC length-prefixed message framing over HTTP/2 bodies.
//!
//! ```text
//! [compressed:1][length:4 big-endian][payload:length]
//! ```

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Body;
use tonic::Status;

use crate::entities::{Message, MessageStream};

pub(crate) const HEADER_SIZE: usize = 5;

/// Largest request message accepted, matching gRPC's default receive limit
pub(crate) const MAX_MESSAGE_LEN: usize = 4 * 1024 * 1024;

/// Prefix an encoded message with the gRPC frame header
pub(crate) fn encode_frame(message: &Message) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_SIZE + message.data.len());
    frame.extend_from_slice(&[0]); // No compression
    frame.extend_from_slice(&(message.data.len() as u32).to_be_bytes());
    frame.extend_from_slice(&message.data);
    frame.freeze()
}

/// Pull-based decoder yielding one message per complete frame
struct FrameDecoder<B> {
    body: B,
    buffer: BytesMut,
    done: bool,
}

impl<B> FrameDecoder<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    fn new(body: B) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            done: false,
        }
    }

    fn try_split(&mut self) -> Result<Option<Message>, Status> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        if self.buffer[0] != 0 {
            return Err(Status::unimplemented("compressed messages are not supported"));
        }
        let len = u32::from_be_bytes([self.buffer[1], self.buffer[2], self.buffer[3], self.buffer[4]])
            as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(Status::resource_exhausted(format!(
                "request message of {len} bytes exceeds the {MAX_MESSAGE_LEN} byte limit"
            )));
        }
        if self.buffer.len() < HEADER_SIZE + len {
            return Ok(None);
        }
        self.buffer.advance(HEADER_SIZE);
        let payload = self.buffer.split_to(len);
        Ok(Some(Message::new(payload.to_vec())))
    }

    async fn next_message(&mut self) -> Option<Result<Message, Status>> {
        if self.done && self.buffer.is_empty() {
            return None;
        }
        loop {
            match self.try_split() {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => {}
                Err(status) => return Some(Err(self.fail(status))),
            }
            if self.done {
                let status = Status::internal("request body ended inside a message frame");
                return Some(Err(self.fail(status)));
            }
            match self.body.frame().await {
                Some(Ok(frame)) => {
                    // Trailers carry nothing for requests.
                    if let Ok(data) = frame.into_data() {
                        self.buffer.extend_from_slice(&data);
                    }
                }
                Some(Err(err)) => {
                    let status = Status::cancelled(format!("request body failed: {err}"));
                    return Some(Err(self.fail(status)));
                }
                None => {
                    self.done = true;
                    if self.buffer.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    fn fail(&mut self, status: Status) -> Status {
        self.done = true;
        self.buffer.clear();
        status
    }
}

/// Lazily decode request messages from an HTTP/2 body
pub(crate) fn decode_body<B>(body: B) -> MessageStream
where
    B: Body<Data = Bytes> + Unpin + Send + 'static,
    B::Error: std::fmt::Display + Send,
{
    stream::unfold(FrameDecoder::new(body), |mut decoder| async move {
        decoder.next_message().await.map(|item| (item, decoder))
    })
    .boxed()
}
