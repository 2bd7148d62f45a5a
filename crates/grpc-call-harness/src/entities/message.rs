use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tonic::Status;

/// Represents an encoded gRPC message (request or response)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self { data: Vec::new() }
    }

    pub fn from_prost<T: prost::Message>(msg: &T) -> Self {
        Self {
            data: msg.encode_to_vec(),
        }
    }

    pub fn decode<T: prost::Message + Default>(&self) -> Result<T, prost::DecodeError> {
        T::decode(self.data.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<bytes::Bytes> for Message {
    fn from(data: bytes::Bytes) -> Self {
        Self::new(data.to_vec())
    }
}

impl From<Message> for Vec<u8> {
    fn from(msg: Message) -> Self {
        msg.data
    }
}

/// Type handle for a protobuf message: its fully-qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self(full_name.into())
    }

    pub fn of<T: prost::Name>() -> Self {
        Self(T::full_name())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lazy, ordered, non-restartable sequence of messages
pub type MessageStream = BoxStream<'static, Result<Message, Status>>;

/// The shape of one side of a call: a single message or a sequence of them
pub enum Payload {
    Single(Message),
    Sequence(MessageStream),
}

impl Payload {
    pub fn is_sequence(&self) -> bool {
        matches!(self, Payload::Sequence(_))
    }

    /// View either shape as a stream
    pub fn into_stream(self) -> MessageStream {
        match self {
            Payload::Single(message) => stream::once(async move { Ok(message) }).boxed(),
            Payload::Sequence(messages) => messages,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Single(msg) => f.debug_tuple("Single").field(msg).finish(),
            Payload::Sequence(_) => f.debug_tuple("Sequence").field(&"<stream>").finish(),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_new() {
        let msg = Message::new(vec![1, 2, 3]);
        assert_eq!(msg.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_message_empty() {
        let msg = Message::empty();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_message_serializes_as_base64() {
        let json = serde_json::to_string(&Message::new(vec![0xff, 0x00, 0x10])).unwrap();
        assert_eq!(json, r#"{"data":"/wAQ"}"#);
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, vec![0xff, 0x00, 0x10]);
    }

    #[test]
    fn test_message_type_name() {
        let ty = MessageType::new("greeter.HelloRequest");
        assert_eq!(ty.name(), "greeter.HelloRequest");
        assert_eq!(ty.to_string(), "greeter.HelloRequest");
    }

    #[tokio::test]
    async fn test_single_payload_as_stream() {
        let items: Vec<_> = Payload::Single(Message::new(vec![7]))
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().data, vec![7]);
    }
}
