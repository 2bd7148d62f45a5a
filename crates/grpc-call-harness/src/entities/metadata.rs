//! Invocation metadata normalization.
//!
//! Headers are folded into an ordered mapping: binary (`-bin`) values become
//! base64 text and repeated keys are joined with commas in arrival order.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hyper::HeaderMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Suffix marking a header whose value is raw bytes
pub const BINARY_SUFFIX: &str = "-bin";

/// gRPC senders may omit base64 padding on binary header values.
const WIRE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Ordered header-name to value mapping attached to a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationMetadata {
    entries: Vec<(String, String)>,
}

impl InvocationMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the custom metadata carried by an HTTP/2 request.
    ///
    /// Protocol headers (`content-type`, `te`, `grpc-*`) are not metadata.
    /// Binary values arrive base64-encoded and are decoded before
    /// normalization re-encodes them.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let raw = headers.iter().filter_map(|(name, value)| {
            let key = name.as_str();
            if is_reserved(key) {
                return None;
            }
            if key.ends_with(BINARY_SUFFIX) {
                match WIRE_BASE64.decode(value.as_bytes()) {
                    Ok(bytes) => Some((key, bytes)),
                    Err(err) => {
                        tracing::warn!(header = key, error = %err, "dropping undecodable binary header");
                        None
                    }
                }
            } else {
                Some((key, value.as_bytes().to_vec()))
            }
        });
        extract_metadata(raw)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object, keys in first-seen order
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn append(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => self.entries.push((key.to_owned(), value)),
        }
    }
}

impl Serialize for InvocationMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Fold raw `(name, bytes)` headers, in receipt order, into normalized metadata
pub fn extract_metadata<'a, I, V>(headers: I) -> InvocationMetadata
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: AsRef<[u8]>,
{
    let mut metadata = InvocationMetadata::new();
    for (key, value) in headers {
        let value = if key.ends_with(BINARY_SUFFIX) {
            STANDARD.encode(value.as_ref())
        } else {
            String::from_utf8_lossy(value.as_ref()).into_owned()
        };
        metadata.append(key, value);
    }
    metadata
}

fn is_reserved(key: &str) -> bool {
    key == "content-type" || key == "te" || key.starts_with("grpc-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_plain_headers_keep_order() {
        let metadata = extract_metadata([("b", "2"), ("a", "1")]);
        assert_eq!(metadata.to_json().unwrap(), r#"{"b":"2","a":"1"}"#);
    }

    #[test]
    fn test_duplicates_joined_in_arrival_order() {
        let metadata = extract_metadata([("x", "1"), ("y", "a"), ("x", "2"), ("x", "3")]);
        assert_eq!(metadata.get("x"), Some("1,2,3"));
        assert_eq!(metadata.to_json().unwrap(), r#"{"x":"1,2,3","y":"a"}"#);
    }

    #[test]
    fn test_concatenation_order_follows_arrival() {
        let first = extract_metadata([("k", "a"), ("k", "b")]);
        let second = extract_metadata([("k", "b"), ("k", "a")]);
        assert_eq!(first.get("k"), Some("a,b"));
        assert_eq!(second.get("k"), Some("b,a"));
    }

    #[test]
    fn test_binary_headers_are_base64() {
        let raw: &[u8] = &[0x00, 0xff, 0x10, 0x80];
        let metadata = extract_metadata([("token-bin", raw)]);
        let encoded = metadata.get("token-bin").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), raw);
    }

    #[test]
    fn test_binary_duplicates_joined() {
        let metadata = extract_metadata([("k-bin", &b"\x01"[..]), ("k-bin", &b"\x02"[..])]);
        assert_eq!(metadata.get("k-bin"), Some("AQ==,Ag=="));
    }

    #[test]
    fn test_from_headers_skips_protocol_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/grpc"));
        headers.insert("te", HeaderValue::from_static("trailers"));
        headers.insert("grpc-timeout", HeaderValue::from_static("1S"));
        headers.insert("foo", HeaderValue::from_static("bar"));
        let metadata = InvocationMetadata::from_headers(&headers);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("foo"), Some("bar"));
    }

    #[test]
    fn test_from_headers_canonicalizes_unpadded_binary() {
        let mut headers = HeaderMap::new();
        headers.append("id-bin", HeaderValue::from_static("AQI"));
        headers.append("id-bin", HeaderValue::from_static("Aw=="));
        let metadata = InvocationMetadata::from_headers(&headers);
        assert_eq!(metadata.get("id-bin"), Some("AQI=,Aw=="));
    }

    #[test]
    fn test_from_headers_skips_undecodable_binary() {
        let mut headers = HeaderMap::new();
        headers.append("a", HeaderValue::from_static("1"));
        headers.append("bad-bin", HeaderValue::from_static("not base64!"));
        headers.append("good-bin", HeaderValue::from_static("AQ=="));
        let metadata = InvocationMetadata::from_headers(&headers);
        assert_eq!(metadata.get("bad-bin"), None);
        assert_eq!(metadata.get("a"), Some("1"));
        assert_eq!(metadata.get("good-bin"), Some("AQ=="));
    }
}
