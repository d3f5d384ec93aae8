//! Run driver.
//!
//! [`NonRegressionRun`] validates the configuration and the flows, builds the
//! session arena, then pushes every frame through session A and then session
//! B, pulling one reference unit per pass. A codec failure stops the run after
//! its pass is reported. Statistics, teardown and the closing report sections
//! run on every path once the arena exists.

use std::fmt::Write as _;
use std::io;

use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use tracing::{debug, error, info};

use crate::aggregator::{ResultAggregator, RunSummary};
use crate::capture::FrameSource;
use crate::codec::CodecFactory;
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::frame::Frame;
use crate::link_layer::LinkLayerType;
use crate::outcome::{FrameOutcome, RunVerdict};
use crate::pipeline::{PacketPipeline, PassSinks, ReferenceInput, ScratchBuffers, StageStatus};
use crate::report::ReportSink;
use crate::session::{CodecStatistics, SessionArena};
use crate::types::{FrameNumber, SessionId};

/// Link layers of the flows of a run, validated at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLinks {
    pub source: LinkLayerType,
    pub reference: Option<LinkLayerType>,
}

impl FlowLinks {
    /// Classifies the source flow and the optional reference flow.
    ///
    /// # Errors
    /// - [`HarnessError::UnsupportedLinkType`] - Either flow uses an unsupported link layer
    pub fn resolve(
        source: &dyn FrameSource,
        reference: Option<&dyn FrameSource>,
    ) -> Result<Self, HarnessError> {
        let source = LinkLayerType::from_linktype(source.link_type(), "source")?;
        let reference = reference
            .map(|flow| LinkLayerType::from_linktype(flow.link_type(), "comparison"))
            .transpose()?;
        Ok(Self { source, reference })
    }
}

/// Outcome of one pass, as kept by the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTrace {
    pub frame: FrameNumber,
    pub session: SessionId,
    pub outcome: FrameOutcome,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub links: FlowLinks,
    pub summary: RunSummary,
    /// Every pass actually run, in order.
    pub passes: Vec<PassTrace>,
    /// Codec counters captured just before teardown.
    pub statistics: Vec<CodecStatistics>,
}

impl RunOutcome {
    pub fn verdict(&self) -> RunVerdict {
        self.summary.verdict
    }

    pub fn exit_code(&self) -> u8 {
        self.summary.verdict.exit_code()
    }
}

/// Machine-readable run summary.
#[serde_as]
#[derive(Debug, Serialize)]
pub struct JsonRunSummary<'a> {
    pub config: &'a HarnessConfig,
    #[serde_as(as = "DisplayFromStr")]
    pub source_link: LinkLayerType,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub reference_link: Option<LinkLayerType>,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl<'a> JsonRunSummary<'a> {
    pub fn new(config: &'a HarnessConfig, outcome: &RunOutcome) -> Self {
        Self {
            config,
            source_link: outcome.links.source,
            reference_link: outcome.links.reference,
            summary: outcome.summary,
        }
    }
}

/// A configured non-regression run.
pub struct NonRegressionRun<'f> {
    config: HarnessConfig,
    factory: &'f dyn CodecFactory,
    scratch_size: Option<usize>,
}

impl<'f> NonRegressionRun<'f> {
    pub fn new(config: HarnessConfig, factory: &'f dyn CodecFactory) -> Self {
        Self {
            config,
            factory,
            scratch_size: None,
        }
    }

    /// Overrides the size of the per-pass scratch buffers.
    pub fn with_scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = Some(size);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Runs every frame of `source` through both sessions.
    ///
    /// # Returns
    /// The run summary; the verdict maps onto the process exit code.
    ///
    /// # Errors
    /// - [`HarnessError::InvalidMaxContexts`], [`HarnessError::UnsupportedLinkType`],
    ///   [`HarnessError::SessionConstruction`] - Startup failed; nothing was processed
    /// - [`HarnessError::Capture`] / [`HarnessError::Io`] - A flow, a sink or the
    ///   report failed mid-run; teardown still ran
    pub fn run<O: io::Write, S: io::Write>(
        &self,
        source: &mut dyn FrameSource,
        mut reference: Option<&mut dyn FrameSource>,
        sinks: &mut PassSinks<O, S>,
        report: &mut dyn ReportSink,
    ) -> Result<RunOutcome, HarnessError> {
        let mut startup_log = String::new();
        let _ = writeln!(
            startup_log,
            "{} CIDs, at most {} contexts per compressor",
            self.config.cid_type, self.config.max_contexts
        );

        let links = match self
            .config
            .validate()
            .and_then(|()| FlowLinks::resolve(&*source, reference.as_deref()))
        {
            Ok(links) => links,
            Err(e) => return Err(fail_startup(report, startup_log, e, false)),
        };
        let _ = writeln!(startup_log, "source flow: {} link layer", links.source);
        if let Some(link) = links.reference {
            let _ = writeln!(startup_log, "reference flow: {link} link layer");
        }
        info!(
            cid_type = %self.config.cid_type,
            max_contexts = self.config.max_contexts,
            source_link = %links.source,
            reference_link = ?links.reference,
            reference_mode = ?self.config.reference_mode,
            "Starting non-regression run"
        );

        let mut arena = match SessionArena::build(self.factory, &self.config) {
            Ok(arena) => arena,
            Err(e) => return Err(fail_startup(report, startup_log, e, true)),
        };
        report.startup(&startup_log, StageStatus::Ok)?;

        let mut pipeline = PacketPipeline::new(links.source, &self.config);
        if let Some(size) = self.scratch_size {
            pipeline = pipeline.with_scratch(ScratchBuffers::with_capacity(size));
        }
        let mut aggregator = ResultAggregator::new();
        let mut passes = Vec::new();

        let processed = self.process_frames(
            &mut arena,
            &mut pipeline,
            links,
            source,
            reference.as_deref_mut(),
            sinks,
            report,
            &mut aggregator,
            &mut passes,
        );

        let summary = aggregator.summary(self.config.reference_mode);
        let statistics = arena.statistics();
        let mut shutdown_log = String::new();
        for (role, session) in arena.shutdown() {
            let _ = writeln!(shutdown_log, "{role} {session} released");
        }
        debug!("Sessions torn down");

        let closed = close_report(report, &summary, &statistics, &shutdown_log);
        let flushed = sinks.flush();
        processed?;
        closed?;
        flushed?;

        match summary.verdict {
            RunVerdict::Fail => error!(
                frames = summary.frames,
                passes = summary.passes,
                successes = summary.counts.successes,
                aborted = summary.aborted,
                "Run failed"
            ),
            verdict => info!(
                frames = summary.frames,
                passes = summary.passes,
                %verdict,
                "Run complete"
            ),
        }

        Ok(RunOutcome {
            links,
            summary,
            passes,
            statistics,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_frames<O: io::Write, S: io::Write>(
        &self,
        arena: &mut SessionArena,
        pipeline: &mut PacketPipeline,
        links: FlowLinks,
        source: &mut dyn FrameSource,
        mut reference: Option<&mut (dyn FrameSource + '_)>,
        sinks: &mut PassSinks<O, S>,
        report: &mut dyn ReportSink,
        aggregator: &mut ResultAggregator,
        passes: &mut Vec<PassTrace>,
    ) -> Result<(), HarnessError> {
        let mut frame_number = FrameNumber::default();
        'frames: while let Some(frame) = source.next_frame()? {
            frame_number += 1;
            for session in SessionId::ALL {
                let reference_unit = match reference.as_deref_mut() {
                    Some(flow) => flow.next_frame()?,
                    None => None,
                };
                let reference_input =
                    reference_input(reference.is_some(), reference_unit.as_ref(), links);

                let record = pipeline.run_pass(
                    arena,
                    session,
                    frame_number,
                    &frame,
                    reference_input,
                    sinks,
                )?;
                report.pass(&record)?;
                passes.push(PassTrace {
                    frame: frame_number,
                    session,
                    outcome: record.outcome,
                });

                if aggregator
                    .record(frame_number, session, record.outcome)
                    .is_break()
                {
                    break 'frames;
                }
            }
        }
        Ok(())
    }
}

fn reference_input<'a>(
    requested: bool,
    unit: Option<&'a Frame>,
    links: FlowLinks,
) -> ReferenceInput<'a> {
    match (requested, unit, links.reference) {
        (false, _, _) => ReferenceInput::NotRequested,
        (true, Some(frame), Some(link)) => ReferenceInput::Unit { frame, link },
        (true, _, _) => ReferenceInput::Exhausted,
    }
}

/// Reports a startup failure and closes the report.
///
/// When sessions were being built, an empty shutdown block follows: whatever
/// was built has already been released.
fn fail_startup(
    report: &mut dyn ReportSink,
    mut log: String,
    error: HarnessError,
    after_sessions: bool,
) -> HarnessError {
    error!(error = %error, "Startup failed");
    let _ = writeln!(log, "{error}");
    let written = report
        .startup(&log, StageStatus::Failed)
        .and_then(|()| {
            if after_sessions {
                report.shutdown("")
            } else {
                Ok(())
            }
        })
        .and_then(|()| report.finish());
    if let Err(io_error) = written {
        error!(error = %io_error, "Cannot write the report");
    }
    error
}

fn close_report(
    report: &mut dyn ReportSink,
    summary: &RunSummary,
    statistics: &[CodecStatistics],
    shutdown_log: &str,
) -> Result<(), HarnessError> {
    report.summary(summary)?;
    report.infos(statistics)?;
    report.shutdown(shutdown_log)?;
    report.finish()?;
    Ok(())
}

/// Reports a startup failure that happened before a run could be configured,
/// such as a flow that cannot be opened.
///
/// # Errors
/// Returns the underlying I/O error.
pub fn report_startup_failure(report: &mut dyn ReportSink, reason: &str) -> io::Result<()> {
    report.startup(&format!("{reason}\n"), StageStatus::Failed)?;
    report.finish()
}
