//! One pass of one frame through one session.
//!
//! Stages run strictly in order and never backtrack:
//! `FramingCheck -> Compress -> ReferenceCompare -> Decompress -> RoundTripCompare -> Done`.
//! A failed framing check, compression or decompression stops the pass; the
//! remaining stages are recorded as failed with the historical explanation.
//! A reference mismatch never stops the pass.

use std::fmt::{self, Write as _};
use std::io;

use tracing::{debug, warn};

use crate::capture::{PcapWriter, SizeSink};
use crate::codec::{CidType, FeedbackBatch, PacketKind};
use crate::compare::compare_packets;
use crate::config::{HarnessConfig, ReferenceMode};
use crate::constants::MAX_ROHC_SIZE;
use crate::error::HarnessError;
use crate::frame::Frame;
use crate::link_layer::LinkLayerType;
use crate::outcome::FrameOutcome;
use crate::session::{FeedbackRouting, SessionArena};
use crate::types::{FrameNumber, SessionId};

const COMPRESSION_FAILED_COMPARE: &str = "Compression failed, cannot compare the packets!";
const COMPRESSION_FAILED_DECOMPRESS: &str =
    "Compression failed, cannot decompress the ROHC packet!";
const DECOMPRESSION_FAILED_COMPARE: &str = "Decompression failed, cannot compare the packets!";
const PACKETS_EQUAL: &str = "Packets are equal";

/// Stages of a pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    FramingCheck,
    Compress,
    ReferenceCompare,
    Decompress,
    RoundTripCompare,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::FramingCheck => "framing-check",
            PipelineStage::Compress => "compress",
            PipelineStage::ReferenceCompare => "reference-compare",
            PipelineStage::Decompress => "decompress",
            PipelineStage::RoundTripCompare => "round-trip-compare",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ok => f.write_str("ok"),
            StageStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Status and log text of one reported stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: PipelineStage,
    pub status: StageStatus,
    pub log: String,
}

impl StageReport {
    fn ok(stage: PipelineStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Ok,
            log: log.into(),
        }
    }

    fn failed(stage: PipelineStage, log: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            log: log.into(),
        }
    }
}

/// Result of the reference comparison stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStatus {
    /// The run has no reference flow.
    NotRequested,
    Matched,
    Mismatched,
    /// The reference flow is exhausted or its unit is too short.
    Unavailable,
    /// References can never match in this run.
    Disabled,
    /// The pass stopped before the stage.
    NotRun,
}

impl ReferenceStatus {
    /// Whether the stage counts as a reference mismatch for the pass outcome.
    pub const fn is_unmatched(self) -> bool {
        matches!(
            self,
            ReferenceStatus::Mismatched | ReferenceStatus::Unavailable | ReferenceStatus::Disabled
        )
    }
}

/// Reference unit supplied for one pass.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceInput<'a> {
    /// No reference flow was configured.
    NotRequested,
    /// Next unit of the reference flow, with that flow's link layer.
    Unit { frame: &'a Frame, link: LinkLayerType },
    /// The reference flow ran out of units.
    Exhausted,
}

/// Everything a pass produced, for the aggregator and the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub frame: FrameNumber,
    pub session: SessionId,
    pub outcome: FrameOutcome,
    /// Last stage entered.
    pub reached: PipelineStage,
    pub stages: Vec<StageReport>,
    pub payload_len: usize,
    /// Ethernet padding trimmed from the frame.
    pub padding: usize,
    pub compressed_len: Option<usize>,
    pub packet_kind: Option<PacketKind>,
    pub decompressed_len: Option<usize>,
    pub reference: ReferenceStatus,
    pub feedback: FeedbackRouting,
}

impl PassRecord {
    fn new(frame: FrameNumber, session: SessionId) -> Self {
        Self {
            frame,
            session,
            outcome: FrameOutcome::Ok,
            reached: PipelineStage::FramingCheck,
            stages: Vec::with_capacity(4),
            payload_len: 0,
            padding: 0,
            compressed_len: None,
            packet_kind: None,
            decompressed_len: None,
            reference: ReferenceStatus::NotRun,
            feedback: FeedbackRouting::default(),
        }
    }

    /// Report of `stage`, if it was recorded.
    pub fn stage(&self, stage: PipelineStage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }
}

/// Scratch buffers reused across passes, sized to the largest unit handled.
#[derive(Debug, Clone)]
pub struct ScratchBuffers {
    compressed: Box<[u8]>,
    decompressed: Box<[u8]>,
}

impl ScratchBuffers {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ROHC_SIZE)
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            compressed: vec![0; size].into_boxed_slice(),
            decompressed: vec![0; size].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.compressed.len()
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional side outputs of every successful compression.
pub struct PassSinks<O: io::Write, S: io::Write> {
    pub output: Option<PcapWriter<O>>,
    pub sizes: Option<SizeSink<S>>,
}

impl PassSinks<io::BufWriter<std::fs::File>, io::BufWriter<std::fs::File>> {
    /// No side outputs.
    pub fn none() -> Self {
        Self::default()
    }
}

impl<O: io::Write, S: io::Write> Default for PassSinks<O, S> {
    fn default() -> Self {
        Self {
            output: None,
            sizes: None,
        }
    }
}

impl<O: io::Write, S: io::Write> PassSinks<O, S> {
    /// # Errors
    /// - [`HarnessError::Capture`] - The output flow cannot be flushed
    /// - [`HarnessError::Io`] - The size sink cannot be flushed
    pub fn flush(&mut self) -> Result<(), HarnessError> {
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        if let Some(sizes) = self.sizes.as_mut() {
            sizes.flush()?;
        }
        Ok(())
    }
}

/// Drives single passes over the session arena.
#[derive(Debug)]
pub struct PacketPipeline {
    link: LinkLayerType,
    cid_type: CidType,
    reference_mode: ReferenceMode,
    scratch: ScratchBuffers,
    feedback: FeedbackBatch,
}

impl PacketPipeline {
    /// Creates a pipeline for frames of link layer `link`.
    pub fn new(link: LinkLayerType, config: &HarnessConfig) -> Self {
        Self {
            link,
            cid_type: config.cid_type,
            reference_mode: config.reference_mode,
            scratch: ScratchBuffers::new(),
            feedback: FeedbackBatch::default(),
        }
    }

    /// Replaces the scratch buffers.
    pub fn with_scratch(mut self, scratch: ScratchBuffers) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn link(&self) -> LinkLayerType {
        self.link
    }

    /// Runs `frame` through `session`.
    ///
    /// Per-frame conditions (malformed frame, codec failure, mismatches) are
    /// reported in the returned record, never as errors.
    ///
    /// # Errors
    /// - [`HarnessError::Capture`] - The output flow cannot be written
    /// - [`HarnessError::Io`] - The size sink cannot be written
    pub fn run_pass<O: io::Write, S: io::Write>(
        &mut self,
        arena: &mut SessionArena,
        session: SessionId,
        frame_number: FrameNumber,
        frame: &Frame,
        reference: ReferenceInput<'_>,
        sinks: &mut PassSinks<O, S>,
    ) -> Result<PassRecord, HarnessError> {
        let mut record = PassRecord::new(frame_number, session);

        let payload = match frame.network_payload(self.link) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(frame = %frame_number, %session, error = %e, "Malformed frame");
                record.outcome = FrameOutcome::MalformedFrame;
                record.stages.extend([
                    StageReport::failed(PipelineStage::Compress, e.to_string()),
                    StageReport::failed(PipelineStage::Decompress, COMPRESSION_FAILED_DECOMPRESS),
                    StageReport::failed(PipelineStage::RoundTripCompare, COMPRESSION_FAILED_COMPARE),
                ]);
                return Ok(record);
            }
        };
        record.payload_len = payload.len();
        record.padding = payload.padding();

        let mut compression_log = String::new();
        if payload.padding() > 0 {
            debug!(
                frame = %frame_number,
                padding = payload.padding(),
                ip_len = payload.len(),
                "Ethernet padding trimmed"
            );
            let _ = writeln!(
                compression_log,
                "The Ethernet frame has {} bytes of padding after the {} byte IP packet!",
                payload.padding(),
                payload.len()
            );
        }

        // Compress
        record.reached = PipelineStage::Compress;
        let capacity = self.scratch.compressed.len();
        let compressed = arena
            .session_mut(session)
            .compress(payload.as_bytes(), &mut self.scratch.compressed)
            .map_err(|e| e.to_string())
            .and_then(|len| checked_len(len, capacity, "compressor"));
        let compressed_len = match compressed {
            Ok(len) => len,
            Err(reason) => {
                compression_log.push_str(&reason);
                record.outcome = FrameOutcome::CompressionFailed;
                record.stages.extend([
                    StageReport::failed(PipelineStage::Compress, compression_log),
                    StageReport::failed(PipelineStage::ReferenceCompare, COMPRESSION_FAILED_COMPARE),
                    StageReport::failed(PipelineStage::Decompress, COMPRESSION_FAILED_DECOMPRESS),
                    StageReport::failed(PipelineStage::RoundTripCompare, COMPRESSION_FAILED_COMPARE),
                ]);
                return Ok(record);
            }
        };
        let unit = &self.scratch.compressed[..compressed_len];
        let kind = PacketKind::classify(unit, self.cid_type);
        record.compressed_len = Some(compressed_len);
        record.packet_kind = kind;
        let _ = write!(
            compression_log,
            "{}-byte IP packet compressed into a {}-byte ROHC packet",
            payload.len(),
            compressed_len
        );
        if let Some(kind) = kind {
            let _ = write!(compression_log, " ({kind})");
        }
        record
            .stages
            .push(StageReport::ok(PipelineStage::Compress, compression_log));

        if let Some(output) = sinks.output.as_mut() {
            output.write_unit(frame, unit)?;
        }
        if let Some(sizes) = sinks.sizes.as_mut() {
            sizes.record(session, frame_number, compressed_len)?;
        }

        // ReferenceCompare
        record.reached = PipelineStage::ReferenceCompare;
        let (status, report) = self.compare_reference(frame_number, session, unit, reference);
        record.reference = status;
        record.stages.push(report);

        // Decompress
        record.reached = PipelineStage::Decompress;
        self.feedback.clear();
        let capacity = self.scratch.decompressed.len();
        let decompressed = arena
            .session_mut(session)
            .decompress(unit, &mut self.scratch.decompressed, &mut self.feedback)
            .map_err(|e| e.to_string())
            .and_then(|len| checked_len(len, capacity, "decompressor"));
        record.feedback = arena.route_feedback(session, &mut self.feedback);

        let mut decompression_log = String::new();
        if !record.feedback.is_empty() {
            let _ = writeln!(
                decompression_log,
                "feedback for compressor {}: {} queued, {} delivered, {} refused",
                session.partner(),
                record.feedback.piggybacked,
                record.feedback.delivered,
                record.feedback.rejected,
            );
        }
        let decompressed_len = match decompressed {
            Ok(len) => len,
            Err(reason) => {
                decompression_log.push_str(&reason);
                record.outcome = FrameOutcome::DecompressionFailed;
                record.stages.extend([
                    StageReport::failed(PipelineStage::Decompress, decompression_log),
                    StageReport::failed(PipelineStage::RoundTripCompare, DECOMPRESSION_FAILED_COMPARE),
                ]);
                return Ok(record);
            }
        };
        record.decompressed_len = Some(decompressed_len);
        let _ = write!(
            decompression_log,
            "{}-byte ROHC packet decompressed into a {}-byte IP packet",
            compressed_len, decompressed_len
        );
        record
            .stages
            .push(StageReport::ok(PipelineStage::Decompress, decompression_log));

        // RoundTripCompare
        record.reached = PipelineStage::RoundTripCompare;
        let comparison = compare_packets(
            payload.as_bytes(),
            &self.scratch.decompressed[..decompressed_len],
        );
        let round_trip_ok = match comparison.diff() {
            None => {
                record
                    .stages
                    .push(StageReport::ok(PipelineStage::RoundTripCompare, PACKETS_EQUAL));
                true
            }
            Some(diff) => {
                warn!(frame = %frame_number, %session, "Decompressed packet differs from the original");
                record
                    .stages
                    .push(StageReport::failed(PipelineStage::RoundTripCompare, diff.to_string()));
                false
            }
        };

        record.reached = PipelineStage::Done;
        record.outcome = if !round_trip_ok {
            FrameOutcome::RoundTripMismatch
        } else if record.reference.is_unmatched() {
            FrameOutcome::ReferenceMismatch
        } else {
            FrameOutcome::Ok
        };
        debug!(frame = %frame_number, %session, outcome = %record.outcome, "Pass complete");
        Ok(record)
    }

    fn compare_reference(
        &self,
        frame_number: FrameNumber,
        session: SessionId,
        unit: &[u8],
        reference: ReferenceInput<'_>,
    ) -> (ReferenceStatus, StageReport) {
        let stage = PipelineStage::ReferenceCompare;
        if self.reference_mode == ReferenceMode::Unmatchable {
            return (
                ReferenceStatus::Disabled,
                StageReport::failed(
                    stage,
                    "RTP bit type option enabled, comparison with ROHC packets of reference \
                     is skipped because they will not match",
                ),
            );
        }

        match reference {
            ReferenceInput::NotRequested => (
                ReferenceStatus::NotRequested,
                StageReport::failed(
                    stage,
                    "No ROHC packets given for reference, cannot compare (run with the -c option)",
                ),
            ),
            ReferenceInput::Exhausted => {
                warn!(frame = %frame_number, %session, "Reference flow exhausted");
                (
                    ReferenceStatus::Unavailable,
                    StageReport::failed(
                        stage,
                        "No more ROHC packets of reference, cannot compare",
                    ),
                )
            }
            ReferenceInput::Unit { frame, link } => {
                let offset = link.header_len();
                let reference_unit = match frame.data().get(offset..) {
                    Some(bytes) if frame.data().len() > offset => bytes,
                    _ => {
                        warn!(frame = %frame_number, %session, "Reference unit too short");
                        return (
                            ReferenceStatus::Unavailable,
                            StageReport::failed(
                                stage,
                                format!(
                                    "ROHC packet of reference is too short ({} bytes), cannot compare",
                                    frame.data().len()
                                ),
                            ),
                        );
                    }
                };
                match compare_packets(reference_unit, unit).diff() {
                    None => (ReferenceStatus::Matched, StageReport::ok(stage, PACKETS_EQUAL)),
                    Some(diff) => {
                        warn!(frame = %frame_number, %session, "Compressed packet differs from the reference");
                        (
                            ReferenceStatus::Mismatched,
                            StageReport::failed(stage, diff.to_string()),
                        )
                    }
                }
            }
        }
    }
}

/// Rejects empty results and lengths past the end of the buffer.
fn checked_len(len: usize, capacity: usize, producer: &str) -> Result<usize, String> {
    if len == 0 {
        Err(format!("{producer} produced an empty packet"))
    } else if len > capacity {
        Err(format!(
            "{producer} reported {len} bytes for a {capacity}-byte buffer"
        ))
    } else {
        Ok(len)
    }
}
