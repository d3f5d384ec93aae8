//! Integration tests for whole non-regression runs.
//!
//! These tests drive [`NonRegressionRun`] end to end: fail-fast on codec
//! failures, non-fatal mismatches, feedback cross-wiring between the two
//! sessions, teardown order and reference flows produced by a previous run.

mod common;
use common::{
    Fault, ScriptedFactory, SharedBuffer, builtin_factory, ethernet_flow, ethernet_frame,
    feedback_sn_base, ipv4_udp, raw_flow, stat,
};

use std::io::Cursor;

use rohcstar_nonreg::capture::{FrameSource, PcapFrameSource, PcapWriter, VecFrameSource};
use rohcstar_nonreg::codec::CodecFactory;
use rohcstar_nonreg::config::{CidType, HarnessConfig};
use rohcstar_nonreg::frame::Frame;
use rohcstar_nonreg::harness::{NonRegressionRun, RunOutcome};
use rohcstar_nonreg::link_layer::LinkLayerType;
use rohcstar_nonreg::outcome::{FrameOutcome, RunVerdict};
use rohcstar_nonreg::pipeline::PassSinks;
use rohcstar_nonreg::report::XmlReport;
use rohcstar_nonreg::session::CodecRole;
use rohcstar_nonreg::types::SessionId;

fn run_flow(
    factory: &dyn CodecFactory,
    config: HarnessConfig,
    source: &mut dyn FrameSource,
) -> (RunOutcome, String) {
    let run = NonRegressionRun::new(config, factory);
    let mut report = XmlReport::new(Vec::new());
    let outcome = run
        .run(source, None, &mut PassSinks::none(), &mut report)
        .expect("run completes");
    (outcome, String::from_utf8(report.into_inner()).unwrap())
}

/// Parses `sn=N` out of a scripted codec journal entry.
fn journal_sn(entry: &str) -> u16 {
    entry
        .rsplit("sn=")
        .next()
        .and_then(|sn| sn.parse().ok())
        .unwrap_or_else(|| panic!("no sequence number in {entry:?}"))
}

#[test]
fn clean_flow_passes_every_pass() {
    let factory = ScriptedFactory::new();
    let mut source = raw_flow(4, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Pass);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.summary.frames, 4);
    assert_eq!(outcome.summary.passes, 8);
    assert_eq!(outcome.summary.counts.successes, 8);
    assert!(!outcome.summary.aborted);
    assert_eq!(xml.matches("<packet id=").count(), 8);
    assert!(xml.contains("<packet id=\"4\" comp=\"2\">"));
}

#[test]
fn compression_failure_stops_the_run_after_its_pass() {
    let factory = ScriptedFactory::new().with_fault(SessionId::A, 3, Fault::FailCompress);
    let mut source = raw_flow(10, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.summary.aborted);
    assert_eq!(outcome.summary.frames, 3);
    assert_eq!(outcome.summary.passes, 5);
    assert_eq!(outcome.summary.counts.compression_failures, 1);
    assert_eq!(outcome.summary.counts.successes, 4);
    assert_eq!(source.remaining(), 7, "frames 4 to 10 must stay unread");

    let last = outcome.passes.last().unwrap();
    assert_eq!(last.frame, 3);
    assert_eq!(last.session, SessionId::A);
    assert_eq!(last.outcome, FrameOutcome::CompressionFailed);

    let log = factory.log();
    assert!(!log.iter().any(|e| e == "comp 2 compress 3"));
    assert!(!log.iter().any(|e| e == "decomp 1 decompress 3"));
    assert!(xml.contains("<compression_failed>1</compression_failed>"));
    assert!(xml.ends_with("</test>\n"));
}

#[test]
fn decompression_failure_stops_the_run() {
    let factory = ScriptedFactory::new().with_fault(SessionId::B, 1, Fault::FailDecompress);
    let mut source = raw_flow(3, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert_eq!(outcome.summary.passes, 2);
    assert_eq!(outcome.summary.counts.decompression_failures, 1);
    assert_eq!(source.remaining(), 2);
    assert!(xml.contains("<decompression_failed>1</decompression_failed>"));
}

#[test]
fn round_trip_mismatch_fails_without_stopping_the_run() {
    let factory = ScriptedFactory::new().with_fault(SessionId::B, 2, Fault::CorruptDecompress);
    let mut source = raw_flow(5, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert!(!outcome.summary.aborted);
    assert_eq!(outcome.summary.passes, 10);
    assert_eq!(outcome.summary.counts.round_trip_mismatches, 1);
    assert_eq!(outcome.summary.counts.successes, 9);
    assert_eq!(outcome.passes[3].outcome, FrameOutcome::RoundTripMismatch);
    assert_eq!(source.remaining(), 0);
    assert!(xml.contains("<matches>9</matches>"));
}

#[test]
fn malformed_frames_are_reported_and_the_run_goes_on() {
    let frames = vec![
        ethernet_frame(&ipv4_udp(40, 4000, 1), 60),
        Frame::with_lengths(vec![0u8; 30], 60, 30),
        ethernet_frame(&ipv4_udp(40, 4000, 3), 60),
    ];
    let factory = ScriptedFactory::new();
    let mut source = ethernet_flow(frames);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert!(!outcome.summary.aborted);
    assert_eq!(outcome.summary.passes, 6);
    assert_eq!(outcome.summary.counts.malformed_frames, 2);
    assert_eq!(outcome.summary.counts.successes, 4);
    let compressions = factory
        .log()
        .iter()
        .filter(|e| e.starts_with("comp ") && e.contains(" compress "))
        .count();
    assert_eq!(compressions, 4, "malformed frames never reach the compressor");
    assert!(xml.contains("bad PCAP packet (len = 60, caplen = 30)"));
    assert!(xml.contains("<compression_failed>2</compression_failed>"));
}

#[test]
fn teardown_releases_decompressors_then_compressors() {
    let factory = ScriptedFactory::new().with_fault(SessionId::A, 2, Fault::FailDecompress);
    let mut source = raw_flow(4, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);
    assert!(outcome.summary.aborted);

    let log = factory.log();
    assert_eq!(
        &log[log.len() - 4..],
        ["drop decomp 1", "drop decomp 2", "drop comp 1", "drop comp 2"]
    );
    assert!(xml.contains(
        "decompressor 1 released\ndecompressor 2 released\n\
         compressor 1 released\ncompressor 2 released\n"
    ));
}

#[test]
fn decompressor_feedback_reaches_only_the_partner_compressor() {
    let factory = ScriptedFactory::new().with_feedback();
    let mut source = raw_flow(3, 60);
    let (outcome, _) = run_flow(&factory, HarnessConfig::default(), &mut source);
    assert_eq!(outcome.verdict(), RunVerdict::Pass);

    let log = factory.log();
    let queued = |session: SessionId| -> Vec<u16> {
        let prefix = format!("comp {session} queued");
        log.iter()
            .filter(|e| e.starts_with(&prefix))
            .map(|e| journal_sn(e))
            .collect()
    };
    let base_a = feedback_sn_base(SessionId::A);
    let base_b = feedback_sn_base(SessionId::B);

    assert_eq!(queued(SessionId::B), [base_a + 1, base_a + 2, base_a + 3]);
    assert_eq!(queued(SessionId::A), [base_b + 1, base_b + 2, base_b + 3]);

    // A's first feedback rides on B's next unit, then reaches A's compressor.
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    let first_a = format!("comp 2 queued sn={}", base_a + 1);
    assert!(position(&first_a) < position("comp 2 compress 1"));
    let delivered = format!("comp 1 delivered sn={}", base_a + 1);
    assert!(position("decomp 2 decompress 1") < position(&delivered));
    assert!(position(&delivered) < position("comp 1 compress 2"));
}

#[test]
fn builtin_codec_feedback_crosses_sessions() {
    let factory = builtin_factory();
    let mut source = raw_flow(2, 60);
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);
    assert_eq!(outcome.verdict(), RunVerdict::Pass);

    let counters = |session: SessionId, role: CodecRole| {
        outcome
            .statistics
            .iter()
            .find(|s| s.session == session && s.role == role)
            .map(|s| s.counters.clone())
            .unwrap()
    };
    let comp_a = counters(SessionId::A, CodecRole::Compressor);
    let comp_b = counters(SessionId::B, CodecRole::Compressor);
    let decomp_a = counters(SessionId::A, CodecRole::Decompressor);

    assert!(stat(&decomp_a, "feedback_sent") >= 1);
    assert!(stat(&comp_b, "feedback_piggybacked") >= 1);
    assert!(stat(&comp_a, "feedback_delivered") >= 1);
    assert_eq!(stat(&comp_a, "feedback_ignored"), 0);
    assert!(xml.contains("<stat name=\"feedback_piggybacked\">"));
}

/// Records the compressed units of `frames`, as a reference capture.
fn record_reference(config: &HarnessConfig, frames: Vec<Frame>) -> Vec<u8> {
    let factory = builtin_factory();
    let run = NonRegressionRun::new(config.clone(), &factory);
    let buffer = SharedBuffer::new();
    let writer = PcapWriter::new(buffer.clone(), "reference.pcap", LinkLayerType::Ethernet).unwrap();
    let mut sinks = PassSinks::<SharedBuffer, Vec<u8>> {
        output: Some(writer),
        sizes: None,
    };
    let mut source = ethernet_flow(frames);
    let mut report = XmlReport::new(Vec::new());
    let outcome = run
        .run(&mut source, None, &mut sinks, &mut report)
        .unwrap();
    assert_eq!(outcome.verdict(), RunVerdict::Pass);
    buffer.contents()
}

fn ethernet_frames(count: u8) -> Vec<Frame> {
    (0..count)
        .map(|i| ethernet_frame(&ipv4_udp(40 + usize::from(i), 4000, i), 60))
        .collect()
}

fn run_against(config: HarnessConfig, reference: Vec<u8>, frames: Vec<Frame>) -> (RunOutcome, String) {
    let factory = builtin_factory();
    let run = NonRegressionRun::new(config, &factory);
    let mut reference = PcapFrameSource::from_reader(Cursor::new(reference), "reference.pcap").unwrap();
    let mut source = ethernet_flow(frames);
    let mut report = XmlReport::new(Vec::new());
    let outcome = run
        .run(
            &mut source,
            Some(&mut reference as &mut dyn FrameSource),
            &mut PassSinks::none(),
            &mut report,
        )
        .unwrap();
    (outcome, String::from_utf8(report.into_inner()).unwrap())
}

#[test]
fn recorded_output_serves_as_a_matching_reference() {
    let config = HarnessConfig::default();
    let reference = record_reference(&config, ethernet_frames(4));
    let (outcome, xml) = run_against(config, reference, ethernet_frames(4));

    assert_eq!(outcome.verdict(), RunVerdict::Pass);
    assert_eq!(outcome.summary.counts.successes, 8);
    assert_eq!(outcome.links.reference, Some(LinkLayerType::Ethernet));
    assert_eq!(xml.matches("<rohc_comparison>").count(), 8);
}

#[test]
fn reference_from_another_cid_type_mismatches_but_round_trips() {
    let reference = record_reference(&HarnessConfig::new(CidType::Small), ethernet_frames(3));
    let (outcome, xml) = run_against(HarnessConfig::new(CidType::Large), reference, ethernet_frames(3));

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert!(!outcome.summary.aborted);
    assert_eq!(outcome.summary.passes, 6);
    assert!(outcome.summary.counts.reference_mismatches > 0);
    assert_eq!(outcome.summary.counts.round_trip_mismatches, 0);
    assert!(xml.contains("packets are different"));
}

#[test]
fn short_reference_flow_fails_the_remaining_passes() {
    let config = HarnessConfig::default();
    let reference = record_reference(&config, ethernet_frames(1));
    let (outcome, xml) = run_against(config, reference, ethernet_frames(2));

    assert_eq!(outcome.verdict(), RunVerdict::Fail);
    assert_eq!(outcome.summary.counts.successes, 2);
    assert_eq!(outcome.summary.counts.reference_mismatches, 2);
    assert!(xml.contains("No more ROHC packets of reference, cannot compare"));
}

#[test]
fn empty_source_passes_with_an_empty_report_body() {
    let factory = ScriptedFactory::new();
    let mut source = VecFrameSource::new(1, Vec::new());
    let (outcome, xml) = run_flow(&factory, HarnessConfig::default(), &mut source);

    assert_eq!(outcome.verdict(), RunVerdict::Pass);
    assert_eq!(outcome.summary.passes, 0);
    assert!(!xml.contains("<packet id="));
    assert!(xml.contains("<packets_processed>0</packets_processed>"));
}
