//! Tallies pass outcomes and derives the run verdict.

use std::ops::ControlFlow;

use serde::Serialize;
use tracing::error;

use crate::config::ReferenceMode;
use crate::outcome::{FrameOutcome, RunVerdict};
use crate::types::{FrameNumber, SessionId};

/// Outcome counters of a run. Every pass increments exactly one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub successes: u32,
    pub reference_mismatches: u32,
    pub round_trip_mismatches: u32,
    pub compression_failures: u32,
    pub decompression_failures: u32,
    pub malformed_frames: u32,
}

impl OutcomeCounts {
    /// Number of passes recorded.
    pub fn passes(&self) -> u32 {
        self.successes
            + self.reference_mismatches
            + self.round_trip_mismatches
            + self.compression_failures
            + self.decompression_failures
            + self.malformed_frames
    }
}

/// Accumulates outcomes across both sessions and the whole flow.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    counts: OutcomeCounts,
    frames: u32,
    aborted_at: Option<(FrameNumber, SessionId)>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one pass.
    ///
    /// # Returns
    /// `ControlFlow::Break` when the outcome must stop the run.
    pub fn record(
        &mut self,
        frame: FrameNumber,
        session: SessionId,
        outcome: FrameOutcome,
    ) -> ControlFlow<()> {
        self.frames = self.frames.max(frame.value());
        let counter = match outcome {
            FrameOutcome::Ok => &mut self.counts.successes,
            FrameOutcome::ReferenceMismatch => &mut self.counts.reference_mismatches,
            FrameOutcome::RoundTripMismatch => &mut self.counts.round_trip_mismatches,
            FrameOutcome::CompressionFailed => &mut self.counts.compression_failures,
            FrameOutcome::DecompressionFailed => &mut self.counts.decompression_failures,
            FrameOutcome::MalformedFrame => &mut self.counts.malformed_frames,
        };
        *counter += 1;

        if outcome.is_fatal() {
            error!(%frame, %session, %outcome, "Codec failure, aborting the run");
            self.aborted_at = Some((frame, session));
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Number of frames that reached at least one pass.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Pass that triggered the fail-fast abort, if any.
    pub fn aborted_at(&self) -> Option<(FrameNumber, SessionId)> {
        self.aborted_at
    }

    /// Derives the verdict from the counters.
    ///
    /// - `Pass`: every pass succeeded (an empty flow passes).
    /// - `Skipped`: with unmatchable references, every pass ended as a
    ///   reference mismatch and nothing failed outright.
    /// - `Fail`: anything else.
    pub fn verdict(&self, reference_mode: ReferenceMode) -> RunVerdict {
        let c = &self.counts;
        let passes = c.passes();
        if reference_mode == ReferenceMode::Unmatchable
            && c.successes == 0
            && c.reference_mismatches == passes
        {
            RunVerdict::Skipped
        } else if c.successes == passes {
            RunVerdict::Pass
        } else {
            RunVerdict::Fail
        }
    }

    /// Snapshot of the run for reports.
    pub fn summary(&self, reference_mode: ReferenceMode) -> RunSummary {
        RunSummary {
            frames: self.frames,
            passes: self.counts.passes(),
            counts: self.counts,
            aborted: self.aborted_at.is_some(),
            verdict: self.verdict(reference_mode),
        }
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u32,
    pub passes: u32,
    #[serde(flatten)]
    pub counts: OutcomeCounts,
    pub aborted: bool,
    pub verdict: RunVerdict,
}

impl RunSummary {
    /// Passes rejected before or by the compressor.
    pub fn compression_failed(&self) -> u32 {
        self.counts.malformed_frames + self.counts.compression_failures
    }
}
