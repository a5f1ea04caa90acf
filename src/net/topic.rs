//! Topic protocol: `log|<kind>|<source>|<file>` topics and two-frame messages.

use std::fmt;

use bytes::Bytes;

use super::error::{NetError, Result};
use super::wire::Multipart;

/// Fixed namespace marker, the first topic field.
pub const NAMESPACE: &str = "log";

/// Field separator, reserved in source names and file identifiers.
pub const SEPARATOR: char = '|';

/// Subscription prefix matching every log topic.
pub const SUBSCRIPTION_PREFIX: &str = "log|";

/// Message kind, the second topic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Line,
    Watch,
    Unwatch,
}

impl Kind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "line" => Some(Self::Line),
            "watch" => Some(Self::Watch),
            "unwatch" => Some(Self::Unwatch),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured topic fields (the namespace is implied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub kind: Kind,
    pub source: String,
    pub file: String,
}

impl Topic {
    pub fn new(kind: Kind, source: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            file: file.into(),
        }
    }

    /// Join the four fields with the separator.
    pub fn encode(&self) -> String {
        encode(self.kind, &self.source, &self.file)
    }

    /// Parse an encoded topic string.
    pub fn decode(topic: &str) -> Result<Self> {
        let (_, kind, source, file) = decode(topic)?;
        Ok(Self {
            kind,
            source: source.to_string(),
            file: file.to_string(),
        })
    }
}

/// Join `(kind, source, file)` into an encoded topic string.
pub fn encode(kind: Kind, source: &str, file: &str) -> String {
    format!("{NAMESPACE}{SEPARATOR}{kind}{SEPARATOR}{source}{SEPARATOR}{file}")
}

/// Split an encoded topic into `(namespace, kind, source, file)`.
///
/// Only the first three separators split; the file field keeps the rest.
pub fn decode(topic: &str) -> Result<(&str, Kind, &str, &str)> {
    let mut fields = topic.splitn(4, SEPARATOR);
    let (Some(namespace), Some(kind), Some(source), Some(file)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(NetError::malformed(format!(
            "expected 4 fields in `{topic}`"
        )));
    };

    if namespace != NAMESPACE {
        return Err(NetError::malformed(format!("unknown namespace `{namespace}`")));
    }
    let kind =
        Kind::parse(kind).ok_or_else(|| NetError::malformed(format!("unknown kind `{kind}`")))?;

    Ok((namespace, kind, source, file))
}

/// Replace reserved separator characters in a producer-chosen field.
pub fn sanitize_field(field: &str) -> String {
    field.replace(SEPARATOR, "_")
}

// ============================================================================
// Message
// ============================================================================

/// Immutable (topic, payload) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: Bytes,
    payload: Bytes,
}

impl Message {
    /// Build a raw message from already-encoded parts.
    pub fn new(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// A `line` message; trailing CR/LF characters are stripped.
    pub fn line(source: &str, file: &str, text: &str) -> Self {
        let text = text.trim_end_matches(['\r', '\n']);
        Self::new(
            encode(Kind::Line, source, file),
            Bytes::copy_from_slice(text.as_bytes()),
        )
    }

    /// A `watch` message (empty payload).
    pub fn watch(source: &str, file: &str) -> Self {
        Self::new(encode(Kind::Watch, source, file), Bytes::new())
    }

    /// An `unwatch` message (empty payload).
    pub fn unwatch(source: &str, file: &str) -> Self {
        Self::new(encode(Kind::Unwatch, source, file), Bytes::new())
    }

    pub fn topic(&self) -> &[u8] {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the topic frame into structured fields.
    pub fn decode_topic(&self) -> Result<Topic> {
        let topic = std::str::from_utf8(&self.topic)
            .map_err(|_| NetError::malformed("topic is not valid UTF-8"))?;
        Topic::decode(topic)
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl From<Message> for Multipart {
    fn from(message: Message) -> Self {
        Multipart::new(vec![message.topic, message.payload])
    }
}

impl TryFrom<Multipart> for Message {
    type Error = NetError;

    fn try_from(multipart: Multipart) -> Result<Self> {
        let count = multipart.len();
        let mut frames = multipart.into_frames().into_iter();
        match (frames.next(), frames.next(), frames.next()) {
            (Some(topic), Some(payload), None) => Ok(Self { topic, payload }),
            _ => Err(NetError::malformed(format!(
                "expected 2 frames, got {count}"
            ))),
        }
    }
}
