//! Per-pass outcomes and the run verdict.

use std::fmt;

use serde::Serialize;

use crate::constants::{EXIT_FAIL, EXIT_PASS, EXIT_SKIP};

/// Classification of one (frame, session) pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FrameOutcome {
    Ok,
    /// Round trip succeeded but the compressed unit did not match the reference.
    ReferenceMismatch,
    /// Decompressed bytes differ from the original payload.
    RoundTripMismatch,
    CompressionFailed,
    DecompressionFailed,
    /// Rejected by the framing check before reaching the codec.
    MalformedFrame,
}

impl FrameOutcome {
    /// Codec failures abort the run: the session state can no longer be trusted.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            FrameOutcome::CompressionFailed | FrameOutcome::DecompressionFailed
        )
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, FrameOutcome::Ok)
    }
}

impl fmt::Display for FrameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameOutcome::Ok => "ok",
            FrameOutcome::ReferenceMismatch => "reference-mismatch",
            FrameOutcome::RoundTripMismatch => "round-trip-mismatch",
            FrameOutcome::CompressionFailed => "compression-failed",
            FrameOutcome::DecompressionFailed => "decompression-failed",
            FrameOutcome::MalformedFrame => "malformed-frame",
        };
        f.write_str(name)
    }
}

/// Final result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunVerdict {
    Pass,
    Fail,
    Skipped,
}

impl RunVerdict {
    /// Process exit code: 0 pass, 1 fail, 77 skipped.
    pub const fn exit_code(self) -> u8 {
        match self {
            RunVerdict::Pass => EXIT_PASS,
            RunVerdict::Fail => EXIT_FAIL,
            RunVerdict::Skipped => EXIT_SKIP,
        }
    }
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunVerdict::Pass => f.write_str("pass"),
            RunVerdict::Fail => f.write_str("fail"),
            RunVerdict::Skipped => f.write_str("skipped"),
        }
    }
}
