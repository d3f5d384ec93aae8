//! Structured run report.
//!
//! [`XmlReport`] renders the historical tag layout: a startup block, one
//! `<packet>` block per pass, the summary, the codec statistics and the
//! shutdown block. Calls must follow that order; [`ReportSink::finish`] closes
//! the document.

use std::borrow::Cow;
use std::io::{self, Write};

use crate::aggregator::RunSummary;
use crate::outcome::FrameOutcome;
use crate::pipeline::{PassRecord, PipelineStage, StageStatus};
use crate::session::CodecStatistics;

/// Receiver of the report sections.
pub trait ReportSink {
    /// Opens the report with the startup log and its status.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn startup(&mut self, log: &str, status: StageStatus) -> io::Result<()>;

    /// Reports one pass.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn pass(&mut self, record: &PassRecord) -> io::Result<()>;

    /// # Errors
    /// Returns the underlying I/O error.
    fn summary(&mut self, summary: &RunSummary) -> io::Result<()>;

    /// Reports the opaque codec counters captured before teardown.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn infos(&mut self, stats: &[CodecStatistics]) -> io::Result<()>;

    /// # Errors
    /// Returns the underlying I/O error.
    fn shutdown(&mut self, log: &str) -> io::Result<()>;

    /// Closes the report.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn finish(&mut self) -> io::Result<()>;
}

/// XML rendering of the report.
#[derive(Debug)]
pub struct XmlReport<W: Write> {
    out: W,
}

impl<W: Write> XmlReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn log_block(&mut self, indent: &str, log: &str) -> io::Result<()> {
        writeln!(self.out, "{indent}<log>")?;
        if !log.is_empty() {
            self.out.write_all(escape(log).as_bytes())?;
            if !log.ends_with('\n') {
                writeln!(self.out)?;
            }
        }
        writeln!(self.out, "{indent}</log>")
    }

    fn stage_block(&mut self, tag: &str, log: &str, status: StageStatus) -> io::Result<()> {
        writeln!(self.out, "\t\t<{tag}>")?;
        self.log_block("\t\t\t", log)?;
        writeln!(self.out, "\t\t\t<status>{status}</status>")?;
        writeln!(self.out, "\t\t</{tag}>")?;
        writeln!(self.out)
    }
}

/// Tag of a stage block. Malformed frames report the historical generic
/// `<comparison>` block instead of the two comparison stages.
fn stage_tag(stage: PipelineStage, outcome: FrameOutcome) -> &'static str {
    match stage {
        PipelineStage::FramingCheck | PipelineStage::Compress => "compression",
        PipelineStage::ReferenceCompare => "rohc_comparison",
        PipelineStage::Decompress => "decompression",
        PipelineStage::RoundTripCompare if outcome == FrameOutcome::MalformedFrame => "comparison",
        PipelineStage::RoundTripCompare | PipelineStage::Done => "ip_comparison",
    }
}

fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

impl<W: Write> ReportSink for XmlReport<W> {
    fn startup(&mut self, log: &str, status: StageStatus) -> io::Result<()> {
        writeln!(self.out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        writeln!(self.out, "<test>")?;
        writeln!(self.out, "\t<startup>")?;
        self.log_block("\t\t", log)?;
        writeln!(self.out, "\t\t<status>{status}</status>")?;
        writeln!(self.out, "\t</startup>")?;
        writeln!(self.out)
    }

    fn pass(&mut self, record: &PassRecord) -> io::Result<()> {
        writeln!(
            self.out,
            "\t<packet id=\"{}\" comp=\"{}\">",
            record.frame.value(),
            record.session.number()
        )?;
        for stage in &record.stages {
            let tag = stage_tag(stage.stage, record.outcome);
            self.stage_block(tag, &stage.log, stage.status)?;
        }
        writeln!(self.out, "\t</packet>")?;
        writeln!(self.out)
    }

    fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out, "\t<summary>")?;
        writeln!(
            self.out,
            "\t\t<packets_processed>{}</packets_processed>",
            summary.passes
        )?;
        writeln!(
            self.out,
            "\t\t<compression_failed>{}</compression_failed>",
            summary.compression_failed()
        )?;
        writeln!(
            self.out,
            "\t\t<decompression_failed>{}</decompression_failed>",
            summary.counts.decompression_failures
        )?;
        writeln!(self.out, "\t\t<matches>{}</matches>", summary.counts.successes)?;
        writeln!(self.out, "\t</summary>")?;
        writeln!(self.out)
    }

    fn infos(&mut self, stats: &[CodecStatistics]) -> io::Result<()> {
        writeln!(self.out, "\t<infos>")?;
        for codec in stats {
            writeln!(self.out, "\t\t<{} id=\"{}\">", codec.role, codec.session.number())?;
            for counter in &codec.counters {
                writeln!(
                    self.out,
                    "\t\t\t<stat name=\"{}\">{}</stat>",
                    counter.name, counter.value
                )?;
            }
            writeln!(self.out, "\t\t</{}>", codec.role)?;
        }
        writeln!(self.out, "\t</infos>")?;
        writeln!(self.out)
    }

    fn shutdown(&mut self, log: &str) -> io::Result<()> {
        writeln!(self.out, "\t<shutdown>")?;
        self.log_block("\t\t", log)?;
        writeln!(self.out, "\t\t<status>ok</status>")?;
        writeln!(self.out, "\t</shutdown>")?;
        writeln!(self.out)
    }

    fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out, "</test>")?;
        self.out.flush()
    }
}
