//! Non-regression harness for ROHC codecs.
//!
//! A recorded flow of frames is pushed through two cross-wired codec sessions.
//! Every frame must survive compress then decompress byte for byte, and each
//! compressed unit may be checked against a reference capture. Feedback from
//! session A's decompressor reaches session B's compressor and the other way
//! round.
//!
//! ```text
//! FrameSource -> PacketPipeline (A, then B) -> ResultAggregator -> verdict
//!                  |  FramingCheck, Compress, ReferenceCompare,
//!                  |  Decompress, RoundTripCompare
//!                  +-> output flow, size sink, report
//! ```

pub mod aggregator;
pub mod capture;
pub mod codec;
pub mod compare;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod harness;
pub mod link_layer;
pub mod logging;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod types;

pub use aggregator::{OutcomeCounts, ResultAggregator, RunSummary};
pub use capture::{FrameSource, PcapFrameSource, PcapWriter, SizeSink, VecFrameSource};
pub use codec::{CodecFactory, Compressor, Decompressor, FeedbackBatch, RohcFactory};
pub use compare::{PacketComparison, PacketDiff, compare_packets};
pub use config::{CidType, ContextSizing, HarnessConfig, ReferenceMode};
pub use error::{CaptureError, CodecError, HarnessError};
pub use frame::{Frame, Payload};
pub use harness::{JsonRunSummary, NonRegressionRun, RunOutcome};
pub use link_layer::LinkLayerType;
pub use outcome::{FrameOutcome, RunVerdict};
pub use pipeline::{PacketPipeline, PassRecord, PassSinks, PipelineStage};
pub use report::{ReportSink, XmlReport};
pub use session::{CodecSession, SessionArena};
pub use types::{ContextId, FrameNumber, SessionId};
