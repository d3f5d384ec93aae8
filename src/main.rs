//! `rohcstar-nonreg` command line.
//!
//! Runs a capture through two cross-wired ROHC sessions, prints the XML report
//! on stdout and exits with 0 (pass), 1 (fail or startup error) or 77 (skipped).

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use tracing::error;

use rohcstar_nonreg::capture::{FrameSource, PcapFrameSource, PcapWriter, SizeSink};
use rohcstar_nonreg::codec::{CrcCalculators, RohcFactory};
use rohcstar_nonreg::config::{CidType, ContextSizing, HarnessConfig};
use rohcstar_nonreg::constants::{DEFAULT_MAX_CONTEXTS, EXIT_FAIL};
use rohcstar_nonreg::harness::{JsonRunSummary, NonRegressionRun, report_startup_failure};
use rohcstar_nonreg::link_layer::LinkLayerType;
use rohcstar_nonreg::logging;
use rohcstar_nonreg::pipeline::PassSinks;
use rohcstar_nonreg::report::{ReportSink, XmlReport};

#[derive(Parser, Debug)]
#[command(author, version, about = "ROHC non-regression test", long_about = None)]
struct CliArgs {
    /// CID type: `smallcid` or `largecid`.
    cid_type: String,

    /// PCAP capture of the IP flow to compress and decompress.
    flow: PathBuf,

    /// Save the compressed units in this PCAP file.
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compare the compressed units with the reference units of this PCAP file.
    /// Without it the reference check is skipped and cannot fail the run.
    #[arg(short = 'c', value_name = "FILE")]
    reference: Option<PathBuf>,

    /// Record the size of every compressed unit in this text file.
    #[arg(long = "rohc-size-output", alias = "rohc-size-ouput", value_name = "FILE")]
    size_output: Option<PathBuf>,

    /// Maximum number of contexts per compressor.
    #[arg(long, value_name = "NUM", default_value_t = DEFAULT_MAX_CONTEXTS)]
    max_contexts: u32,

    /// Give the first compressor one context fewer, as historical captures were made.
    #[arg(long)]
    asymmetric_contexts: bool,

    /// Write a JSON run summary to this file.
    #[arg(long, value_name = "FILE")]
    summary_json: Option<PathBuf>,

    /// Increase log verbosity (repeatable). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_FAIL),
            };
        }
    };
    logging::init(args.verbose);

    let mut report = XmlReport::new(io::stdout().lock());
    match run(&args, &mut report) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAIL)
        }
    }
}

/// Reports `result` as a startup failure when it is an error.
fn at_startup<T, E>(report: &mut dyn ReportSink, result: Result<T, E>) -> anyhow::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            report_startup_failure(report, &e.to_string()).context("cannot write the report")?;
            Err(e.into())
        }
    }
}

fn build_config(args: &CliArgs) -> Result<HarnessConfig, rohcstar_nonreg::HarnessError> {
    let cid_type: CidType = args.cid_type.parse()?;
    let context_sizing = if args.asymmetric_contexts {
        ContextSizing::HistoricalAsymmetric
    } else {
        ContextSizing::Symmetric
    };
    Ok(HarnessConfig {
        cid_type,
        max_contexts: args.max_contexts,
        context_sizing,
        ..HarnessConfig::default()
    })
}

fn run(args: &CliArgs, report: &mut dyn ReportSink) -> anyhow::Result<u8> {
    let config = at_startup(report, build_config(args))?;

    let mut source = at_startup(report, PcapFrameSource::open(&args.flow))?;
    let link = at_startup(
        report,
        LinkLayerType::from_linktype(source.link_type(), "source"),
    )?;

    let output = match &args.output {
        Some(path) => Some(at_startup(report, PcapWriter::create(path, link))?),
        None => None,
    };
    let mut reference = match &args.reference {
        Some(path) => Some(at_startup(report, PcapFrameSource::open(path))?),
        None => None,
    };
    let sizes = match &args.size_output {
        Some(path) => Some(at_startup(report, SizeSink::create(path))?),
        None => None,
    };

    let factory = RohcFactory::new(Arc::new(CrcCalculators::new()));
    let harness = NonRegressionRun::new(config.clone(), &factory);
    let mut sinks = PassSinks { output, sizes };
    let outcome = harness.run(
        &mut source,
        reference.as_mut().map(|flow| flow as &mut dyn FrameSource),
        &mut sinks,
        report,
    )?;

    if let Some(path) = &args.summary_json {
        let file = File::create(path)
            .with_context(|| format!("cannot create the summary file {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &JsonRunSummary::new(&config, &outcome))
            .with_context(|| format!("cannot write the summary file {}", path.display()))?;
    }

    Ok(outcome.exit_code())
}
