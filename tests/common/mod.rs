//! Common test utilities for the non-regression harness integration tests.
//!
//! Provides frame builders for the supported link layers, a scripted codec
//! whose failures and feedback are fully controlled by the test, and a shared
//! writer so report output can be inspected after a run.
#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use rohcstar_nonreg::capture::VecFrameSource;
use rohcstar_nonreg::codec::{
    AckType, CodecFactory, Compressor, CompressorConfig, CrcCalculators, Decompressor,
    DecompressorConfig, FeedbackBatch, FeedbackElement, RohcFactory, Statistic,
};
use rohcstar_nonreg::constants::{LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL, LINKTYPE_RAW};
use rohcstar_nonreg::error::CodecError;
use rohcstar_nonreg::frame::Frame;
use rohcstar_nonreg::types::{ContextId, SessionId};

/// Builds an IPv4/UDP packet of `len` bytes (at least 28).
///
/// # Default values
/// - IP addresses: 192.168.0.1 -> 192.168.0.2
/// - UDP destination port: 5000
/// - Payload bytes: `seed`
pub fn ipv4_udp(len: usize, src_port: u16, seed: u8) -> Vec<u8> {
    assert!(len >= 28, "IPv4/UDP packets need 28 bytes");
    let mut packet = vec![seed; len];
    packet[0] = 0x45;
    packet[1] = 0;
    packet[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    packet[4..8].copy_from_slice(&[0, 0, 0x40, 0]);
    packet[8] = 64;
    packet[9] = 17;
    packet[10..12].copy_from_slice(&[0, 0]);
    packet[12..16].copy_from_slice(&[192, 168, 0, 1]);
    packet[16..20].copy_from_slice(&[192, 168, 0, 2]);
    packet[20..22].copy_from_slice(&src_port.to_be_bytes());
    packet[22..24].copy_from_slice(&5000u16.to_be_bytes());
    packet[24..26].copy_from_slice(&((len - 20) as u16).to_be_bytes());
    packet[26..28].copy_from_slice(&[0, 0]);
    packet
}

/// Builds an IPv6/UDP packet with `payload_len` bytes after the UDP header.
pub fn ipv6_udp(payload_len: usize, seed: u8) -> Vec<u8> {
    let udp_len = 8 + payload_len;
    let mut packet = vec![seed; 40 + udp_len];
    packet[0..4].copy_from_slice(&[0x60, 0, 0, 0]);
    packet[4..6].copy_from_slice(&(udp_len as u16).to_be_bytes());
    packet[6] = 17;
    packet[7] = 64;
    packet[8..24].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    packet[24..40].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
    packet[40..42].copy_from_slice(&4000u16.to_be_bytes());
    packet[42..44].copy_from_slice(&5000u16.to_be_bytes());
    packet[44..46].copy_from_slice(&(udp_len as u16).to_be_bytes());
    packet
}

/// Wraps `ip` in an Ethernet frame, zero-padded up to `min_len` bytes.
pub fn ethernet_frame(ip: &[u8], min_len: usize) -> Frame {
    let ether_type: [u8; 2] = if ip.first().map(|b| b >> 4) == Some(6) {
        [0x86, 0xdd]
    } else {
        [0x08, 0x00]
    };
    let mut data = vec![0x02, 0, 0, 0, 0, 1, 0x02, 0, 0, 0, 0, 2];
    data.extend_from_slice(&ether_type);
    data.extend_from_slice(ip);
    if data.len() < min_len {
        data.resize(min_len, 0);
    }
    Frame::new(data)
}

/// Wraps `ip` in a Linux cooked-mode (SLL) frame.
pub fn linux_cooked_frame(ip: &[u8]) -> Frame {
    let mut data = vec![0u8; 14];
    data.extend_from_slice(&[0x08, 0x00]);
    data.extend_from_slice(ip);
    Frame::new(data)
}

/// Raw-IP source of `count` distinct IPv4/UDP frames of `len` bytes.
pub fn raw_flow(count: usize, len: usize) -> VecFrameSource {
    let frames = (0..count).map(|i| Frame::new(ipv4_udp(len, 4000, i as u8)));
    VecFrameSource::new(LINKTYPE_RAW, frames)
}

pub fn ethernet_flow(frames: Vec<Frame>) -> VecFrameSource {
    VecFrameSource::new(LINKTYPE_ETHERNET, frames)
}

pub fn linux_cooked_flow(frames: Vec<Frame>) -> VecFrameSource {
    VecFrameSource::new(LINKTYPE_LINUX_SLL, frames)
}

/// Factory for the built-in codec.
pub fn builtin_factory() -> RohcFactory {
    RohcFactory::new(Arc::new(CrcCalculators::new()))
}

pub fn stat(stats: &[Statistic], name: &str) -> u64 {
    stats
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.value)
        .unwrap_or_else(|| panic!("no statistic named {name}"))
}

/// Writer whose content stays readable after the writer is moved into a sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.contents()).expect("utf-8 output")
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Failure injected into a scripted codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The compressor returns an error.
    FailCompress,
    /// The decompressor returns an error.
    FailDecompress,
    /// The decompressor succeeds but flips the last byte.
    CorruptDecompress,
}

/// Shared journal of codec calls, in call order.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Feedback sequence number base for a session's decompressor: 1000 for A,
/// 2000 for B. Tells where a feedback element was produced.
pub const fn feedback_sn_base(session: SessionId) -> u16 {
    1000 * session.number() as u16
}

/// Builds [`ScriptedCompressor`] and [`ScriptedDecompressor`] pairs.
///
/// Compressed units are `[n, sn_1 (2 bytes), .., sn_n (2 bytes), payload..]`
/// where `sn_i` are the piggybacked feedback sequence numbers.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    log: CallLog,
    faults: Vec<(SessionId, u32, Fault)>,
    emit_feedback: bool,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects `fault` on the `call`-th (1-based) call of `session`'s codec.
    pub fn with_fault(mut self, session: SessionId, call: u32, fault: Fault) -> Self {
        self.faults.push((session, call, fault));
        self
    }

    /// Makes every decompression emit one ACK.
    pub fn with_feedback(mut self) -> Self {
        self.emit_feedback = true;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn faults_for(&self, session: SessionId) -> Vec<(u32, Fault)> {
        self.faults
            .iter()
            .filter(|(s, _, _)| *s == session)
            .map(|(_, call, fault)| (*call, *fault))
            .collect()
    }
}

impl CodecFactory for ScriptedFactory {
    fn create_compressor(
        &self,
        session: SessionId,
        _config: &CompressorConfig,
    ) -> Result<Box<dyn Compressor>, CodecError> {
        Ok(Box::new(ScriptedCompressor {
            session,
            calls: 0,
            faults: self.faults_for(session),
            pending: Vec::new(),
            log: Rc::clone(&self.log),
        }))
    }

    fn create_decompressor(
        &self,
        session: SessionId,
        _config: &DecompressorConfig,
    ) -> Result<Box<dyn Decompressor>, CodecError> {
        Ok(Box::new(ScriptedDecompressor {
            session,
            calls: 0,
            faults: self.faults_for(session),
            emit_feedback: self.emit_feedback,
            log: Rc::clone(&self.log),
        }))
    }
}

fn has_fault(faults: &[(u32, Fault)], call: u32, fault: Fault) -> bool {
    faults.iter().any(|&(c, f)| c == call && f == fault)
}

#[derive(Debug)]
pub struct ScriptedCompressor {
    session: SessionId,
    calls: u32,
    faults: Vec<(u32, Fault)>,
    pending: Vec<u16>,
    log: CallLog,
}

impl Compressor for ScriptedCompressor {
    fn compress(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        self.calls += 1;
        self.log
            .borrow_mut()
            .push(format!("comp {} compress {}", self.session, self.calls));
        if has_fault(&self.faults, self.calls, Fault::FailCompress) {
            return Err(CodecError::Internal("scripted compression failure".into()));
        }
        let header_len = 1 + 2 * self.pending.len();
        let total = header_len + payload.len();
        if out.len() < total {
            return Err(CodecError::Internal("output buffer too small".into()));
        }
        out[0] = self.pending.len() as u8;
        for (i, sn) in self.pending.drain(..).enumerate() {
            out[1 + 2 * i..3 + 2 * i].copy_from_slice(&sn.to_be_bytes());
        }
        out[header_len..total].copy_from_slice(payload);
        Ok(total)
    }

    fn piggyback_feedback(&mut self, element: FeedbackElement) {
        self.log
            .borrow_mut()
            .push(format!("comp {} queued sn={}", self.session, element.sn));
        self.pending.push(element.sn);
    }

    fn deliver_feedback(&mut self, element: &FeedbackElement) -> Result<(), CodecError> {
        self.log
            .borrow_mut()
            .push(format!("comp {} delivered sn={}", self.session, element.sn));
        Ok(())
    }

    fn statistics(&self) -> Vec<Statistic> {
        vec![Statistic::new("packets", u64::from(self.calls))]
    }
}

impl Drop for ScriptedCompressor {
    fn drop(&mut self) {
        self.log
            .borrow_mut()
            .push(format!("drop comp {}", self.session));
    }
}

#[derive(Debug)]
pub struct ScriptedDecompressor {
    session: SessionId,
    calls: u32,
    faults: Vec<(u32, Fault)>,
    emit_feedback: bool,
    log: CallLog,
}

impl Decompressor for ScriptedDecompressor {
    fn decompress(
        &mut self,
        packet: &[u8],
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        self.calls += 1;
        self.log
            .borrow_mut()
            .push(format!("decomp {} decompress {}", self.session, self.calls));

        let count = usize::from(*packet.first().ok_or(CodecError::EmptyPayload)?);
        let header_len = 1 + 2 * count;
        if packet.len() < header_len {
            return Err(CodecError::Internal("truncated unit".into()));
        }
        for i in 0..count {
            let sn = u16::from_be_bytes([packet[1 + 2 * i], packet[2 + 2 * i]]);
            feedback
                .received
                .push(FeedbackElement::new(ContextId::new(0), AckType::Ack, sn));
        }
        if self.emit_feedback {
            let sn = feedback_sn_base(self.session) + self.calls as u16;
            feedback
                .to_send
                .push(FeedbackElement::new(ContextId::new(0), AckType::Ack, sn));
        }

        if has_fault(&self.faults, self.calls, Fault::FailDecompress) {
            return Err(CodecError::Internal("scripted decompression failure".into()));
        }
        let payload = &packet[header_len..];
        if out.len() < payload.len() {
            return Err(CodecError::Internal("output buffer too small".into()));
        }
        out[..payload.len()].copy_from_slice(payload);
        if has_fault(&self.faults, self.calls, Fault::CorruptDecompress) {
            if let Some(last) = out[..payload.len()].last_mut() {
                *last ^= 0xFF;
            }
        }
        Ok(payload.len())
    }

    fn statistics(&self) -> Vec<Statistic> {
        vec![Statistic::new("packets", u64::from(self.calls))]
    }
}

impl Drop for ScriptedDecompressor {
    fn drop(&mut self) {
        self.log
            .borrow_mut()
            .push(format!("drop decomp {}", self.session));
    }
}
