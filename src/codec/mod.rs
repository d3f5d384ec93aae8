//! Codec seam between the harness and a ROHC implementation.
//!
//! The harness only ever talks to [`Compressor`] and [`Decompressor`] trait
//! objects built by a [`CodecFactory`]. Feedback never flows through owning
//! pointers between codecs: a decompressor hands it back in a [`FeedbackBatch`]
//! and the session arena routes it to the partner session's compressor.
//!
//! [`RohcFactory`] builds the built-in codec.

pub mod cid;
pub mod compressor;
pub mod context_manager;
pub mod crc;
pub mod decompressor;
pub mod feedback;
pub mod packet_kind;
pub mod profile;
pub mod writer;

use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;

use crate::constants::{DEFAULT_IR_REFRESH_INTERVAL, DEFAULT_IR_REPETITIONS, DEFAULT_MAX_CONTEXTS};
use crate::error::CodecError;
use crate::types::SessionId;

pub use cid::CidType;
pub use compressor::RohcCompressor;
pub use crc::CrcCalculators;
pub use decompressor::RohcDecompressor;
pub use feedback::{AckType, FeedbackElement, OperatingMode};
pub use packet_kind::PacketKind;
pub use profile::{ProfileSet, RohcProfile};

/// One named counter reported by a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistic {
    pub name: &'static str,
    pub value: u64,
}

impl Statistic {
    pub const fn new(name: &'static str, value: u64) -> Self {
        Self { name, value }
    }
}

/// Feedback produced while decompressing one unit.
///
/// Filled even when decompression fails, so that a STATIC-NACK still reaches
/// the compressor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedbackBatch {
    /// Generated by the decompressor, to be piggybacked by the partner compressor.
    pub to_send: Vec<FeedbackElement>,
    /// Extracted from the unit, to be delivered to the partner compressor.
    pub received: Vec<FeedbackElement>,
}

impl FeedbackBatch {
    pub fn is_empty(&self) -> bool {
        self.to_send.is_empty() && self.received.is_empty()
    }

    pub fn clear(&mut self) {
        self.to_send.clear();
        self.received.clear();
    }
}

/// Compressor half of a codec session.
pub trait Compressor: Debug {
    /// Compresses one network-layer payload into `out`.
    ///
    /// Pending piggybacked feedback is written ahead of the compressed header.
    ///
    /// # Returns
    /// The number of bytes written to `out`.
    ///
    /// # Errors
    /// Any [`CodecError`]; the harness treats it as a compression failure.
    fn compress(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError>;

    /// Queues feedback produced by the partner's decompressor, to be sent with
    /// the next compressed unit.
    fn piggyback_feedback(&mut self, element: FeedbackElement);

    /// Applies feedback that travelled back to this compressor.
    ///
    /// # Errors
    /// - [`CodecError::ContextNotFound`] - No context for the feedback's CID
    fn deliver_feedback(&mut self, element: &FeedbackElement) -> Result<(), CodecError>;

    /// Opaque counters for the report.
    fn statistics(&self) -> Vec<Statistic>;
}

/// Decompressor half of a codec session.
pub trait Decompressor: Debug {
    /// Decompresses one ROHC unit into `out`, collecting feedback in `feedback`.
    ///
    /// # Returns
    /// The number of bytes written to `out`.
    ///
    /// # Errors
    /// Any [`CodecError`]; the harness treats it as a decompression failure.
    fn decompress(
        &mut self,
        packet: &[u8],
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError>;

    /// Opaque counters for the report.
    fn statistics(&self) -> Vec<Statistic>;
}

/// Compressor settings for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressorConfig {
    pub cid_type: CidType,
    pub max_contexts: u32,
    pub profiles: ProfileSet,
    pub ir_refresh_interval: u32,
    pub ir_repetitions: u32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            cid_type: CidType::Small,
            max_contexts: DEFAULT_MAX_CONTEXTS,
            profiles: ProfileSet::all(),
            ir_refresh_interval: DEFAULT_IR_REFRESH_INTERVAL,
            ir_repetitions: DEFAULT_IR_REPETITIONS,
        }
    }
}

/// Decompressor settings for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecompressorConfig {
    pub cid_type: CidType,
    pub max_contexts: u32,
}

impl Default for DecompressorConfig {
    fn default() -> Self {
        Self {
            cid_type: CidType::Small,
            max_contexts: DEFAULT_MAX_CONTEXTS,
        }
    }
}

/// Builds the codecs of both sessions.
pub trait CodecFactory {
    /// # Errors
    /// Any [`CodecError`]; the harness aborts at startup.
    fn create_compressor(
        &self,
        session: SessionId,
        config: &CompressorConfig,
    ) -> Result<Box<dyn Compressor>, CodecError>;

    /// # Errors
    /// Any [`CodecError`]; the harness aborts at startup.
    fn create_decompressor(
        &self,
        session: SessionId,
        config: &DecompressorConfig,
    ) -> Result<Box<dyn Decompressor>, CodecError>;
}

/// Factory for the built-in codec.
///
/// Holds the CRC tables built once by the entry point.
#[derive(Debug, Clone)]
pub struct RohcFactory {
    crc: Arc<CrcCalculators>,
}

impl RohcFactory {
    pub fn new(crc: Arc<CrcCalculators>) -> Self {
        Self { crc }
    }
}

impl CodecFactory for RohcFactory {
    fn create_compressor(
        &self,
        session: SessionId,
        config: &CompressorConfig,
    ) -> Result<Box<dyn Compressor>, CodecError> {
        if config.profiles.is_empty() {
            return Err(CodecError::NoProfile);
        }
        Ok(Box::new(RohcCompressor::new(
            session,
            config,
            Arc::clone(&self.crc),
        )))
    }

    fn create_decompressor(
        &self,
        session: SessionId,
        config: &DecompressorConfig,
    ) -> Result<Box<dyn Decompressor>, CodecError> {
        Ok(Box::new(RohcDecompressor::new(
            session,
            config,
            Arc::clone(&self.crc),
        )))
    }
}
