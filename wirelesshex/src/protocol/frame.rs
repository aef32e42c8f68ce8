//! ASCII framing for the FLX wire protocol.
//!
//! Five frame shapes travel on the radio and on the serial command line:
//!
//! ```text
//! FLX?                  handshake query
//! FLX?EOF               end-of-transfer query
//! FLX?OK                handshake / EOF acknowledgement
//! FLX:<seq>:<payload>   data chunk (payload is raw bytes on the radio,
//!                       an Intel-HEX record on the serial line)
//! FLX:<seq>:OK          per-chunk acknowledgement
//! ```
//!
//! Frame lengths are corruption-exposed, so every parser here is total:
//! no read ever indexes past the buffer it was given.

/// Protocol tag opening every frame.
pub const TAG: &[u8] = b"FLX";

/// Handshake query, host to remote.
pub const HANDSHAKE: &[u8] = b"FLX?";

/// Handshake and EOF acknowledgement, remote to host.
pub const HANDSHAKE_OK: &[u8] = b"FLX?OK";

/// End-of-transfer query, host to remote.
pub const EOF: &[u8] = b"FLX?EOF";

/// Serial-side rejection of an invalid chunk line.
pub const INVALID: &[u8] = b"FLX:INV";

/// Maximum decimal digits in a sequence field.
pub const MAX_SEQ_DIGITS: usize = 4;

/// Shortest possible chunk line: `FLX:0:`.
pub const MIN_CHUNK_HEADER: usize = 6;

/// A frame sent towards the receiver (radio) or the relay (serial line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `FLX?` — open a transfer session.
    Handshake,
    /// `FLX?EOF` — no more chunks.
    Eof,
    /// `FLX:<seq>:<payload>` — one sequenced chunk.
    Data {
        /// Chunk sequence number, starting at 0 per session.
        seq: u16,
        /// Chunk payload, owned by the frame.
        payload: Vec<u8>,
    },
}

/// A frame sent back by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `FLX?OK` — handshake or EOF accepted.
    HandshakeOk,
    /// `FLX:<seq>:OK` — chunk `seq` stored.
    ChunkOk {
        /// Acknowledged sequence number.
        seq: u16,
    },
}

/// Why a buffer failed to parse as a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Not a protocol frame; the state machines ignore it.
    Unrecognized,
    /// A `FLX:` header with a broken sequence field; aborts the session.
    BadSequence,
}

/// Bounds-checked reader over a frame buffer.
struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { rest: buf }
    }

    /// Consume `prefix` if the buffer starts with it.
    fn eat(&mut self, prefix: &[u8]) -> bool {
        if self.rest.starts_with(prefix) {
            self.rest = &self.rest[prefix.len()..];
            true
        } else {
            false
        }
    }

    /// Consume 1..=[`MAX_SEQ_DIGITS`] decimal digits.
    fn take_seq(&mut self) -> Option<u16> {
        let digits = self
            .rest
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 || digits > MAX_SEQ_DIGITS {
            return None;
        }
        let mut seq: u16 = 0;
        for c in &self.rest[..digits] {
            seq = seq * 10 + u16::from(c - b'0');
        }
        self.rest = &self.rest[digits..];
        Some(seq)
    }

    fn take_rest(self) -> &'a [u8] {
        self.rest
    }
}

impl Request {
    /// Parse a radio packet payload or serial command line.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(buf);
        if !cursor.eat(TAG) {
            return Err(FrameError::Unrecognized);
        }
        if cursor.eat(b"?") {
            return match cursor.take_rest() {
                b"" => Ok(Self::Handshake),
                b"EOF" => Ok(Self::Eof),
                _ => Err(FrameError::Unrecognized),
            };
        }
        if !cursor.eat(b":") {
            return Err(FrameError::Unrecognized);
        }
        let seq = cursor.take_seq().ok_or(FrameError::BadSequence)?;
        if !cursor.eat(b":") {
            return Err(FrameError::BadSequence);
        }
        Ok(Self::Data {
            seq,
            payload: cursor.take_rest().to_vec(),
        })
    }

    /// Serialize to the wire shape.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Handshake => HANDSHAKE.to_vec(),
            Self::Eof => EOF.to_vec(),
            Self::Data { seq, payload } => {
                let mut frame = format!("FLX:{seq}:").into_bytes();
                frame.extend_from_slice(payload);
                frame
            },
        }
    }
}

impl Reply {
    /// Parse an acknowledgement payload.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf == HANDSHAKE_OK {
            return Some(Self::HandshakeOk);
        }
        let mut cursor = Cursor::new(buf);
        if !cursor.eat(b"FLX:") {
            return None;
        }
        let seq = cursor.take_seq()?;
        if cursor.take_rest() == b":OK" {
            Some(Self::ChunkOk { seq })
        } else {
            None
        }
    }

    /// Serialize to the wire shape.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::HandshakeOk => HANDSHAKE_OK.to_vec(),
            Self::ChunkOk { seq } => format!("FLX:{seq}:OK").into_bytes(),
        }
    }
}
