//! Wire format serialization and deserialization.
//!
//! Every frame starts with the same 4-byte header; multi-byte fields are
//! little-endian. Layouts are fixed per kind and the decoder insists on the
//! exact length.
//!
//! ## Header
//!
//! ```text
//! kind (1) || seq (1) || src (1) || dest (1)
//!
//! kind: 0 = hand-off, 1 = poll, 2 = response
//! ```
//!
//! ## Poll (12 bytes)
//!
//! ```text
//! header (4) || zero padding (8)
//! ```
//!
//! ## Response (20 bytes)
//!
//! ```text
//! header (4) || poll_rx_ts (4) || resp_tx_ts (4) || zero padding (8)
//! ```
//!
//! Timestamps are the low 32 bits of the responder's device clock. The
//! response echoes the sequence number of the poll it answers.
//!
//! ## Hand-off (4 + 8·N² bytes)
//!
//! ```text
//! header (4) || matrix (N × N × f64, row-major)
//! ```

use alloc::vec::Vec;
use core::fmt;

use crate::matrix::ConnectivityMatrix;
use crate::types::{
    NodeId, MSG_HANDOFF, MSG_POLL, MSG_RESPONSE, POLL_FRAME_LEN, RESPONSE_FRAME_LEN,
};

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    UnexpectedEof,
    /// Frame length does not match the layout for its kind.
    InvalidLength,
    /// Kind byte is not a known message kind.
    UnknownKind(u8),
    /// Source or destination is outside the ring.
    InvalidNodeId(u8),
    /// Well-formed frame for another node.
    NotAddressed { dest: NodeId },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of frame"),
            DecodeError::InvalidLength => write!(f, "invalid frame length"),
            DecodeError::UnknownKind(k) => write!(f, "unknown message kind {}", k),
            DecodeError::InvalidNodeId(id) => write!(f, "node id {} outside the ring", id),
            DecodeError::NotAddressed { dest } => write!(f, "frame addressed to node {}", dest),
        }
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true if there are no more bytes to read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a u32 in little-endian format.
    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an f64 in little-endian format.
    pub fn read_f64_le(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a u32 in little-endian format.
    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an f64 in little-endian format.
    pub fn write_f64_le(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Zero-fill up to `len` bytes total.
    pub fn pad_to(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }

    /// Finish writing and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

/// Common frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub kind: u8,
    pub seq: u8,
    pub src: NodeId,
    pub dest: NodeId,
}

impl Encode for Header {
    fn encode(&self, w: &mut Writer) {
        w.write_u8(self.kind);
        w.write_u8(self.seq);
        w.write_u8(self.src);
        w.write_u8(self.dest);
    }
}

impl Decode for Header {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Header {
            kind: r.read_u8()?,
            seq: r.read_u8()?,
            src: r.read_u8()?,
            dest: r.read_u8()?,
        })
    }
}

impl Encode for ConnectivityMatrix {
    fn encode(&self, w: &mut Writer) {
        for &d in self.cells() {
            w.write_f64_le(d);
        }
    }
}

/// Consumes the rest of the reader; the dimension is implied by the length.
impl Decode for ConnectivityMatrix {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let remaining = r.remaining();
        if remaining % 8 != 0 {
            return Err(DecodeError::InvalidLength);
        }
        let count = remaining / 8;
        let n = integer_sqrt(count).ok_or(DecodeError::InvalidLength)?;
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            cells.push(r.read_f64_le()?);
        }
        ConnectivityMatrix::from_cells(n, cells).ok_or(DecodeError::InvalidLength)
    }
}

/// Exact square root, if `v` is a perfect square.
fn integer_sqrt(v: usize) -> Option<usize> {
    let mut n = 0usize;
    while n * n < v {
        n += 1;
    }
    (n * n == v).then_some(n)
}

/// Kind-specific frame body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Token hand-off carrying the sender's matrix.
    Handoff(ConnectivityMatrix),
    /// Ranging request.
    Poll,
    /// Ranging reply with the responder's timestamps.
    Response { poll_rx_ts: u32, resp_tx_ts: u32 },
}

/// A decoded protocol frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub seq: u8,
    pub src: NodeId,
    pub dest: NodeId,
    pub payload: Payload,
}

impl Message {
    pub fn poll(seq: u8, src: NodeId, dest: NodeId) -> Self {
        Self {
            seq,
            src,
            dest,
            payload: Payload::Poll,
        }
    }

    pub fn response(seq: u8, src: NodeId, dest: NodeId, poll_rx_ts: u32, resp_tx_ts: u32) -> Self {
        Self {
            seq,
            src,
            dest,
            payload: Payload::Response {
                poll_rx_ts,
                resp_tx_ts,
            },
        }
    }

    pub fn handoff(seq: u8, src: NodeId, dest: NodeId, matrix: ConnectivityMatrix) -> Self {
        Self {
            seq,
            src,
            dest,
            payload: Payload::Handoff(matrix),
        }
    }

    /// Kind byte for this message.
    pub fn kind(&self) -> u8 {
        match self.payload {
            Payload::Handoff(_) => MSG_HANDOFF,
            Payload::Poll => MSG_POLL,
            Payload::Response { .. } => MSG_RESPONSE,
        }
    }

    fn header(&self) -> Header {
        Header {
            kind: self.kind(),
            seq: self.seq,
            src: self.src,
            dest: self.dest,
        }
    }

    /// Decode a frame for an `num_nodes`-node ring.
    pub fn decode(bytes: &[u8], num_nodes: usize) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let header = Header::decode(&mut r)?;

        let expected_len = match header.kind {
            MSG_HANDOFF => crate::config::handoff_frame_len(num_nodes),
            MSG_POLL => POLL_FRAME_LEN,
            MSG_RESPONSE => RESPONSE_FRAME_LEN,
            other => return Err(DecodeError::UnknownKind(other)),
        };
        if bytes.len() != expected_len {
            return Err(DecodeError::InvalidLength);
        }
        for id in [header.src, header.dest] {
            if id as usize >= num_nodes {
                return Err(DecodeError::InvalidNodeId(id));
            }
        }

        let payload = match header.kind {
            MSG_HANDOFF => {
                let matrix = ConnectivityMatrix::decode(&mut r)?;
                if matrix.dimension() != num_nodes {
                    return Err(DecodeError::InvalidLength);
                }
                Payload::Handoff(matrix)
            }
            MSG_POLL => Payload::Poll,
            _ => Payload::Response {
                poll_rx_ts: r.read_u32_le()?,
                resp_tx_ts: r.read_u32_le()?,
            },
        };

        Ok(Message {
            seq: header.seq,
            src: header.src,
            dest: header.dest,
            payload,
        })
    }

    /// Decode a frame and require it to be addressed to `local`.
    pub fn decode_addressed(
        bytes: &[u8],
        local: NodeId,
        num_nodes: usize,
    ) -> Result<Self, DecodeError> {
        let msg = Self::decode(bytes, num_nodes)?;
        if msg.dest != local {
            return Err(DecodeError::NotAddressed { dest: msg.dest });
        }
        Ok(msg)
    }
}

impl Encode for Message {
    fn encode(&self, w: &mut Writer) {
        self.header().encode(w);
        match &self.payload {
            Payload::Handoff(matrix) => matrix.encode(w),
            Payload::Poll => w.pad_to(POLL_FRAME_LEN),
            Payload::Response {
                poll_rx_ts,
                resp_tx_ts,
            } => {
                w.write_u32_le(*poll_rx_ts);
                w.write_u32_le(*resp_tx_ts);
                w.pad_to(RESPONSE_FRAME_LEN);
            }
        }
    }
}
