//! Error types for the non-regression harness and its built-in codec.
//!
//! Configuration and I/O problems are fatal and surface as [`HarnessError`]
//! before any frame is processed. Codec problems surface as [`CodecError`] and
//! are turned into per-frame outcomes by the pipeline, never propagated past it.
//! The `thiserror` crate is used for ergonomic error definitions.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ContextId, SessionId};

/// Which structure was being parsed or built when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseContext {
    RohcPacketInput,
    FeedbackElement,
    FeedbackData,
    LargeCid,
    IrHeader,
    NormalPacket,
    CorePacketAfterCid,
    CompressedOutput,
    DecompressedOutput,
}

impl fmt::Display for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseContext::RohcPacketInput => "ROHC packet input",
            ParseContext::FeedbackElement => "feedback element",
            ParseContext::FeedbackData => "feedback data",
            ParseContext::LargeCid => "large CID",
            ParseContext::IrHeader => "IR header",
            ParseContext::NormalPacket => "normal packet",
            ParseContext::CorePacketAfterCid => "core ROHC packet after CID processing",
            ParseContext::CompressedOutput => "compressed output buffer",
            ParseContext::DecompressedOutput => "decompressed output buffer",
        };
        f.write_str(name)
    }
}

/// CRC algorithms used by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcType {
    Crc8,
}

impl fmt::Display for CrcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcType::Crc8 => f.write_str("CRC-8"),
        }
    }
}

/// Errors that can occur while parsing a ROHC packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RohcParsingError {
    /// Insufficient data to parse a complete field or structure.
    #[error("Incomplete packet data: needed {needed} bytes, got {got} for {context}")]
    NotEnoughData {
        needed: usize,
        got: usize,
        context: ParseContext,
    },

    /// Invalid or unsupported ROHC profile identifier encountered.
    #[error("Invalid or unsupported ROHC profile ID: 0x{0:02X}")]
    InvalidProfileId(u8),

    /// Unrecognized ROHC packet type discriminator for the current profile.
    #[error(
        "Invalid ROHC packet type discriminator: 0x{discriminator:02X} for profile {profile_id:?}"
    )]
    InvalidPacketType {
        discriminator: u8,
        profile_id: Option<u8>,
    },

    /// CRC validation failed, indicating data corruption or context mismatch.
    #[error("CRC mismatch: expected 0x{expected:X}, got 0x{calculated:X} for {crc_type}")]
    CrcMismatch {
        expected: u8,
        calculated: u8,
        crc_type: CrcType,
    },

    /// Segmented ROHC packets are not handled.
    #[error("Segmented ROHC packets are not supported")]
    SegmentNotSupported,

    /// A large CID used a reserved SDVL prefix.
    #[error("Invalid SDVL-encoded large CID prefix: 0x{0:02X}")]
    InvalidLargeCid(u8),
}

/// Errors that can occur while building a ROHC packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RohcBuildingError {
    /// Provided buffer was too small for the packet being built.
    #[error("Buffer too small: needed {needed} bytes, have {available} for {context}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        context: ParseContext,
    },

    /// The CID cannot be represented with the configured CID type.
    #[error("{cid} exceeds the largest encodable CID {max}")]
    CidOutOfRange { cid: ContextId, max: u16 },

    /// A feedback element's data does not fit a single size octet.
    #[error("Feedback data of {size} bytes does not fit a feedback element")]
    FeedbackTooLarge { size: usize },
}

/// Errors reported by a compressor or decompressor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Error during packet parsing.
    #[error("Parsing error: {0}")]
    Parsing(#[from] RohcParsingError),

    /// Error during packet building.
    #[error("Building error: {0}")]
    Building(#[from] RohcBuildingError),

    /// No decompression context exists for the given CID.
    #[error("Context not found for {0}")]
    ContextNotFound(ContextId),

    /// The packet requested a profile that is not enabled or not implemented.
    #[error("Unsupported ROHC profile: 0x{0:02X}")]
    UnsupportedProfile(u8),

    /// None of the enabled profiles can carry the payload.
    #[error("No enabled profile can compress this packet")]
    NoProfile,

    /// Empty payloads cannot be compressed.
    #[error("Cannot compress an empty packet")]
    EmptyPayload,

    /// Unexpected internal logic error, or a failure injected by a test codec.
    #[error("Internal codec error: {0}")]
    Internal(String),
}

/// Errors raised by capture flows (input, reference and output).
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The flow could not be opened or created.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The flow is not a readable legacy PCAP stream.
    #[error("failed to parse capture {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Writing a record failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal errors that abort a run at startup.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The flow's link layer is not one the harness can strip.
    #[error("link layer type {linktype} not supported in {flow} dump (supported = 1, 113, 101)")]
    UnsupportedLinkType { linktype: i32, flow: &'static str },

    /// The CID type argument is neither `smallcid` nor `largecid`.
    #[error("invalid CID type '{0}', only 'smallcid' and 'largecid' expected")]
    InvalidCidType(String),

    /// The maximum number of contexts is out of range.
    #[error("the maximum number of ROHC contexts should be between 1 and 16384, got {0}")]
    InvalidMaxContexts(u32),

    /// A compressor or decompressor could not be created.
    #[error("cannot create the {role} {session}: {reason}")]
    SessionConstruction {
        role: &'static str,
        session: SessionId,
        reason: String,
    },

    /// A capture flow failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Other I/O failure (size sink, report writer).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_enough_data_error_display() {
        let err = RohcParsingError::NotEnoughData {
            needed: 10,
            got: 5,
            context: ParseContext::IrHeader,
        };
        assert_eq!(
            format!("{}", err),
            "Incomplete packet data: needed 10 bytes, got 5 for IR header"
        );
    }

    #[test]
    fn crc_mismatch_error_display() {
        let err = RohcParsingError::CrcMismatch {
            expected: 0x12,
            calculated: 0x34,
            crc_type: CrcType::Crc8,
        };
        assert_eq!(
            format!("{}", err),
            "CRC mismatch: expected 0x12, got 0x34 for CRC-8"
        );
    }

    #[test]
    fn codec_error_from_parsing_error() {
        let parsing_err = RohcParsingError::InvalidProfileId(0x42);
        let codec_err = CodecError::from(parsing_err.clone());
        match codec_err {
            CodecError::Parsing(inner) => assert_eq!(inner, parsing_err),
            _ => panic!("Incorrect CodecError variant"),
        }
    }

    #[test]
    fn codec_error_from_building_error() {
        let building_err = RohcBuildingError::CidOutOfRange {
            cid: ContextId::new(20),
            max: 15,
        };
        assert_eq!(
            CodecError::from(building_err).to_string(),
            "Building error: CID20 exceeds the largest encodable CID 15"
        );
    }

    #[test]
    fn harness_error_messages_name_the_problem() {
        let err = HarnessError::UnsupportedLinkType {
            linktype: 9,
            flow: "source",
        };
        assert!(err.to_string().contains("link layer type 9"));
        assert!(err.to_string().contains("source"));

        let err = HarnessError::InvalidCidType("mediumcid".to_string());
        assert_eq!(
            err.to_string(),
            "invalid CID type 'mediumcid', only 'smallcid' and 'largecid' expected"
        );

        let err = HarnessError::SessionConstruction {
            role: "decompressor",
            session: SessionId::B,
            reason: "out of memory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot create the decompressor 2: out of memory"
        );
    }
}
