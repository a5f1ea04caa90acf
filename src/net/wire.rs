//! Wire codec for the fabric.
//!
//! Two record kinds travel on a TCP connection:
//!
//! ```text
//! Greeting (connecting side -> binding side, once):
//! ┌────────┬─────────┬──────┬─────────────┬──────────────────────────┐
//! │ "LGMS" │ version │ role │ prefix cnt  │ (u16 len + bytes) * cnt  │
//! │ 4B     │ u8      │ u8   │ u16 BE      │                          │
//! └────────┴─────────┴──────┴─────────────┴──────────────────────────┘
//!
//! Multipart message:
//! ┌─────────────┬─────────────┬──────────────────────────────┐
//! │ body len    │ frame cnt   │ (u32 len + bytes) * cnt      │
//! │ u32 BE      │ u16 BE      │                              │
//! └─────────────┴─────────────┴──────────────────────────────┘
//! ```
//!
//! Decoding is incremental: an incomplete record stays in the buffer and
//! `None` is returned until the rest arrives.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{NetError, Result, is_timeout};

const MAGIC: &[u8; 4] = b"LGMS";
const VERSION: u8 = 1;

/// Upper bound on a single message body.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

const GREETING_HEADER_LEN: usize = 8;
const READ_CHUNK: usize = 8 * 1024;

// ============================================================================
// Greeting
// ============================================================================

/// Socket role announced by the connecting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Subscriber,
    Pusher,
}

impl Role {
    const fn code(self) -> u8 {
        match self {
            Self::Subscriber => 1,
            Self::Pusher => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Subscriber),
            2 => Ok(Self::Pusher),
            other => Err(NetError::Protocol(format!("unknown role {other}"))),
        }
    }
}

/// First record on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub role: Role,
    /// Subscription prefixes (subscribers only).
    pub prefixes: Vec<Bytes>,
}

impl Greeting {
    pub fn subscriber(prefixes: Vec<Bytes>) -> Self {
        Self {
            role: Role::Subscriber,
            prefixes,
        }
    }

    pub fn pusher() -> Self {
        Self {
            role: Role::Pusher,
            prefixes: Vec::new(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(GREETING_HEADER_LEN + 16);
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.role.code());
        buf.put_u16(self.prefixes.len() as u16);
        for prefix in &self.prefixes {
            buf.put_u16(prefix.len() as u16);
            buf.put_slice(prefix);
        }
        buf.freeze()
    }

    /// Take one greeting off the front of `buf`, if it is complete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < GREETING_HEADER_LEN {
            return Ok(None);
        }
        if &buf[..4] != MAGIC {
            return Err(NetError::Protocol("bad greeting magic".into()));
        }
        if buf[4] != VERSION {
            return Err(NetError::Protocol(format!(
                "unsupported protocol version {}",
                buf[4]
            )));
        }
        let role = Role::from_code(buf[5])?;
        let count = u16::from_be_bytes([buf[6], buf[7]]) as usize;

        // Walk prefixes without consuming until the whole greeting is here
        let mut offset = GREETING_HEADER_LEN;
        for _ in 0..count {
            if buf.len() < offset + 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
            offset += 2 + len;
            if buf.len() < offset {
                return Ok(None);
            }
        }

        let mut record = buf.split_to(offset).freeze();
        record.advance(GREETING_HEADER_LEN);
        let mut prefixes = Vec::with_capacity(count);
        for _ in 0..count {
            let len = record.get_u16() as usize;
            prefixes.push(record.split_to(len));
        }

        Ok(Some(Self { role, prefixes }))
    }
}

// ============================================================================
// Multipart
// ============================================================================

/// An ordered list of opaque frames; the unit of delivery on the fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart(Vec<Bytes>);

impl Multipart {
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self(frames)
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.0
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First frame, used for subscription prefix matching.
    pub fn first(&self) -> &[u8] {
        self.0.first().map(|f| f.as_ref()).unwrap_or_default()
    }

    /// Encode as a length-prefixed record.
    pub fn encode(&self) -> Result<Bytes> {
        let body_len = 2 + self.0.iter().map(|f| 4 + f.len()).sum::<usize>();
        if body_len > MAX_MESSAGE_LEN || self.0.len() > u16::MAX as usize {
            return Err(NetError::Protocol(format!(
                "message too large ({body_len} bytes, {} frames)",
                self.0.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_u32(body_len as u32);
        buf.put_u16(self.0.len() as u16);
        for frame in &self.0 {
            buf.put_u32(frame.len() as u32);
            buf.put_slice(frame);
        }
        Ok(buf.freeze())
    }

    /// Take one message off the front of `buf`, if it is complete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if body_len > MAX_MESSAGE_LEN {
            return Err(NetError::Protocol(format!(
                "message length {body_len} exceeds limit"
            )));
        }
        if body_len < 2 {
            return Err(NetError::Protocol("message body too short".into()));
        }
        if buf.len() < 4 + body_len {
            return Ok(None);
        }

        let mut body = buf.split_to(4 + body_len).freeze();
        body.advance(4);
        let count = body.get_u16() as usize;
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            if body.remaining() < 4 {
                return Err(NetError::Protocol("truncated frame header".into()));
            }
            let len = body.get_u32() as usize;
            if body.remaining() < len {
                return Err(NetError::Protocol("truncated frame".into()));
            }
            frames.push(body.split_to(len));
        }
        if body.has_remaining() {
            return Err(NetError::Protocol("trailing bytes after frames".into()));
        }

        Ok(Some(Self(frames)))
    }
}

impl From<Vec<Bytes>> for Multipart {
    fn from(frames: Vec<Bytes>) -> Self {
        Self(frames)
    }
}

// ============================================================================
// Stream helpers
// ============================================================================

/// Buffered record reader that survives read timeouts mid-record.
pub struct RecordReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read the peer's greeting. `Ok(None)` means the read timed out.
    pub fn read_greeting(&mut self) -> Result<Option<Greeting>> {
        loop {
            if let Some(greeting) = Greeting::decode(&mut self.buf)? {
                return Ok(Some(greeting));
            }
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Read one message. `Ok(None)` means the read timed out.
    pub fn read_message(&mut self) -> Result<Option<Multipart>> {
        loop {
            if let Some(message) = Multipart::decode(&mut self.buf)? {
                return Ok(Some(message));
            }
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Read once into the buffer. Returns `false` on timeout.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.inner.read(&mut chunk) {
            Ok(0) => Err(NetError::Transport(io::Error::from(
                io::ErrorKind::UnexpectedEof,
            ))),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if is_timeout(&e) => Ok(false),
            Err(e) => Err(NetError::Transport(e)),
        }
    }
}

/// Write a pre-encoded record.
pub fn write_record<W: Write>(writer: &mut W, record: &[u8]) -> io::Result<()> {
    writer.write_all(record)?;
    writer.flush()
}
