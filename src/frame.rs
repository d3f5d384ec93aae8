//! Captured frames and the network-layer payload view the pipeline compresses.
//!
//! A [`Payload`] never copies frame bytes: it is a `Bytes` slice sharing the
//! frame's backing storage, narrowed by the link-layer offset and, for padded
//! link types, by the length the IP header declares.

use std::fmt;

use bytes::Bytes;

use crate::constants::IPV6_BASE_HEADER_LEN;
use crate::link_layer::LinkLayerType;

/// One captured link-layer unit, read-only once produced by a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
    total_len: u32,
    captured_len: u32,
    ts_sec: u32,
    ts_usec: u32,
}

impl Frame {
    /// Creates a frame whose captured length equals its on-wire length.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u32;
        Self {
            data,
            total_len: len,
            captured_len: len,
            ts_sec: 0,
            ts_usec: 0,
        }
    }

    /// Creates a frame with explicit capture metadata.
    ///
    /// `data` holds the captured bytes; `total_len` is the original on-wire length.
    pub fn with_lengths(data: impl Into<Bytes>, total_len: u32, captured_len: u32) -> Self {
        Self {
            data: data.into(),
            total_len,
            captured_len,
            ts_sec: 0,
            ts_usec: 0,
        }
    }

    /// Sets the capture timestamp.
    pub fn with_timestamp(mut self, ts_sec: u32, ts_usec: u32) -> Self {
        self.ts_sec = ts_sec;
        self.ts_usec = ts_usec;
        self
    }

    /// Captured bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Original on-wire length.
    pub fn total_len(&self) -> u32 {
        self.total_len
    }

    /// Number of bytes actually captured.
    pub fn captured_len(&self) -> u32 {
        self.captured_len
    }

    /// Capture timestamp as (seconds, microseconds).
    pub fn timestamp(&self) -> (u32, u32) {
        (self.ts_sec, self.ts_usec)
    }

    /// Link-layer header bytes, if the frame is long enough to hold them.
    pub fn link_header(&self, link: LinkLayerType) -> Option<&[u8]> {
        self.data.get(..link.header_len())
    }

    /// Validates the frame against its link layer and extracts the network-layer
    /// payload, trimming Ethernet padding when the IP header declares a shorter
    /// packet.
    ///
    /// # Errors
    /// - [`FramingError`] - The frame is too short for its link layer or truncated
    pub fn network_payload(&self, link: LinkLayerType) -> Result<Payload, FramingError> {
        let offset = link.header_len();
        let total_len = self.total_len as usize;
        if total_len <= offset
            || self.total_len != self.captured_len
            || self.data.len() < total_len
        {
            return Err(FramingError {
                total_len: self.total_len,
                captured_len: self.captured_len,
            });
        }

        let bytes = self.data.slice(offset..total_len);
        let padded = link.min_frame_len() == Some(total_len);
        Ok(Payload::new(bytes, padded))
    }
}

/// A frame rejected before reaching the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingError {
    pub total_len: u32,
    pub captured_len: u32,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bad PCAP packet (len = {}, caplen = {})",
            self.total_len, self.captured_len
        )
    }
}

/// Network-layer view of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Bytes,
    padding: usize,
}

impl Payload {
    /// Builds the payload view, trimming padding when `may_be_padded` is set.
    fn new(bytes: Bytes, may_be_padded: bool) -> Self {
        if !may_be_padded {
            return Self { bytes, padding: 0 };
        }
        match declared_ip_length(&bytes) {
            Some(declared) if declared < bytes.len() => {
                let padding = bytes.len() - declared;
                Self {
                    bytes: bytes.slice(..declared),
                    padding,
                }
            }
            _ => Self { bytes, padding: 0 },
        }
    }

    /// Payload bytes after padding removal.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle on the payload bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of trailing padding bytes removed from the frame.
    pub fn padding(&self) -> usize {
        self.padding
    }
}

/// Length the IP header declares for the whole packet.
///
/// IPv4 carries it in the total-length field; IPv6 declares only its payload,
/// after the fixed 40-byte base header. Other versions declare nothing usable.
pub fn declared_ip_length(packet: &[u8]) -> Option<usize> {
    let version = packet.first()? >> 4;
    match version {
        4 => {
            let field = packet.get(2..4)?;
            Some(u16::from_be_bytes([field[0], field[1]]) as usize)
        }
        6 => {
            let field = packet.get(4..6)?;
            Some(IPV6_BASE_HEADER_LEN + u16::from_be_bytes([field[0], field[1]]) as usize)
        }
        _ => None,
    }
}
