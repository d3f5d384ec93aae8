//! Integration tests for the per-pass side outputs and link layers.
//!
//! Covers the output flow (link-layer header with the ROHC marker followed by
//! the compressed unit), the size sink and flows of every supported link type.

mod common;
use common::{
    SharedBuffer, builtin_factory, ethernet_flow, ethernet_frame, ipv4_udp, ipv6_udp,
    linux_cooked_flow, linux_cooked_frame, raw_flow,
};

use std::io::Cursor;

use tempfile::tempdir;

use rohcstar_nonreg::capture::{FrameSource, PcapFrameSource, PcapWriter, SizeSink};
use rohcstar_nonreg::config::HarnessConfig;
use rohcstar_nonreg::constants::{LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL};
use rohcstar_nonreg::frame::Frame;
use rohcstar_nonreg::harness::{NonRegressionRun, RunOutcome};
use rohcstar_nonreg::link_layer::LinkLayerType;
use rohcstar_nonreg::outcome::RunVerdict;
use rohcstar_nonreg::pipeline::PassSinks;
use rohcstar_nonreg::report::XmlReport;

struct Outputs {
    outcome: RunOutcome,
    flow: Vec<u8>,
    sizes: String,
}

fn run_with_sinks(source: &mut dyn FrameSource, link: LinkLayerType) -> Outputs {
    let factory = builtin_factory();
    let run = NonRegressionRun::new(HarnessConfig::default(), &factory);
    let flow = SharedBuffer::new();
    let sizes = SharedBuffer::new();
    let mut sinks = PassSinks {
        output: Some(PcapWriter::new(flow.clone(), "out.pcap", link).unwrap()),
        sizes: Some(SizeSink::new(sizes.clone())),
    };
    let mut report = XmlReport::new(Vec::new());
    let outcome = run
        .run(source, None, &mut sinks, &mut report)
        .unwrap();
    Outputs {
        outcome,
        flow: flow.contents(),
        sizes: sizes.text(),
    }
}

fn read_back(flow: Vec<u8>) -> (i32, Vec<Frame>) {
    let mut source = PcapFrameSource::from_reader(Cursor::new(flow), "out.pcap").unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = source.next_frame().unwrap() {
        frames.push(frame);
    }
    (source.link_type(), frames)
}

#[test]
fn ethernet_output_carries_the_marker_in_host_order() {
    let frames = vec![
        ethernet_frame(&ipv4_udp(40, 4000, 1), 60).with_timestamp(10, 500),
        ethernet_frame(&ipv4_udp(90, 4000, 2), 60).with_timestamp(11, 0),
    ];
    let mut source = ethernet_flow(frames);
    let outputs = run_with_sinks(&mut source, LinkLayerType::Ethernet);
    assert_eq!(outputs.outcome.verdict(), RunVerdict::Pass);

    let (linktype, records) = read_back(outputs.flow);
    assert_eq!(linktype, LINKTYPE_ETHERNET);
    assert_eq!(records.len(), 4, "one record per pass");
    for record in &records {
        assert_eq!(&record.data()[12..14], &[0x2f, 0x16]);
        assert!(record.data().len() > 14);
    }
    assert_eq!(records[0].timestamp(), (10, 500));
    assert_eq!(records[3].timestamp(), (11, 0));
}

#[test]
fn linux_cooked_output_carries_the_marker_in_network_order() {
    let frames = (0..3)
        .map(|i| linux_cooked_frame(&ipv4_udp(64, 4000, i)))
        .collect();
    let mut source = linux_cooked_flow(frames);
    let outputs = run_with_sinks(&mut source, LinkLayerType::LinuxCooked);
    assert_eq!(outputs.outcome.verdict(), RunVerdict::Pass);
    assert_eq!(outputs.outcome.links.source, LinkLayerType::LinuxCooked);

    let (linktype, records) = read_back(outputs.flow);
    assert_eq!(linktype, LINKTYPE_LINUX_SLL);
    assert_eq!(records.len(), 6);
    for record in &records {
        assert_eq!(&record.data()[14..16], &[0x16, 0x2f]);
    }
}

#[test]
fn size_sink_records_every_compressed_unit() {
    let mut source = raw_flow(3, 80);
    let outputs = run_with_sinks(&mut source, LinkLayerType::Raw);

    let lines: Vec<&str> = outputs.sizes.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("compressor_num = 1\tpacket_num = 1\trohc_size = "));
    assert!(lines[1].starts_with("compressor_num = 2\tpacket_num = 1\trohc_size = "));
    assert!(lines[5].starts_with("compressor_num = 2\tpacket_num = 3\trohc_size = "));

    let (_, records) = read_back(outputs.flow);
    for (line, record) in lines.iter().zip(&records) {
        let size: usize = line.rsplit(" = ").next().unwrap().parse().unwrap();
        assert_eq!(size, record.data().len(), "raw records hold only the unit");
    }
}

#[test]
fn ipv6_ethernet_flow_round_trips() {
    let frames = (0..4)
        .map(|i| ethernet_frame(&ipv6_udp(20 + usize::from(i), i), 60))
        .collect();
    let mut source = ethernet_flow(frames);
    let outputs = run_with_sinks(&mut source, LinkLayerType::Ethernet);

    assert_eq!(outputs.outcome.verdict(), RunVerdict::Pass);
    assert_eq!(outputs.outcome.summary.counts.successes, 8);
}

#[test]
fn failed_compressions_write_nothing() {
    let frames = vec![
        ethernet_frame(&ipv4_udp(40, 4000, 1), 60),
        Frame::with_lengths(vec![0u8; 20], 60, 20),
    ];
    let mut source = ethernet_flow(frames);
    let outputs = run_with_sinks(&mut source, LinkLayerType::Ethernet);

    assert_eq!(outputs.outcome.summary.counts.malformed_frames, 2);
    assert_eq!(outputs.sizes.lines().count(), 2);
    let (_, records) = read_back(outputs.flow);
    assert_eq!(records.len(), 2);
}

#[test]
fn output_flow_round_trips_through_the_filesystem() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("output.pcap");

    let factory = builtin_factory();
    let run = NonRegressionRun::new(HarnessConfig::default(), &factory);
    let mut sinks = PassSinks {
        output: Some(PcapWriter::create(&path, LinkLayerType::Raw).unwrap()),
        sizes: None::<SizeSink<Vec<u8>>>,
    };
    let mut source = raw_flow(2, 50);
    let mut report = XmlReport::new(Vec::new());
    run.run(&mut source, None, &mut sinks, &mut report).unwrap();
    drop(sinks);

    let mut written = PcapFrameSource::open(&path).unwrap();
    let mut count = 0;
    while written.next_frame().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 4);
}
