//! Built-in ROHC compressor.
//!
//! Every payload is mapped to a flow and a context. Profile selection runs over
//! the enabled set; the built-in backend implements the Uncompressed profile
//! (RFC 3095, Section 5.10), so all flows travel as IR packets followed by
//! normal packets.
//!
//! Context state machine:
//! - IR: sent on context creation, after a NACK / STATIC-NACK, and every
//!   `ir_refresh_interval` packets in U-mode.
//! - Normal: reached after `ir_repetitions` IR packets in U-mode, or as soon
//!   as an ACK moves the context to O-mode.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, trace};

use super::cid::{CidType, add_cid_octet, encode_large_cid};
use super::context_manager::ContextTable;
use super::crc::CrcCalculators;
use super::feedback::{AckType, FeedbackElement, OperatingMode};
use super::profile::{FlowKey, PayloadInfo, ProfileSet, RohcProfile};
use super::writer::PacketWriter;
use super::{Compressor, CompressorConfig, Statistic};
use crate::constants::ROHC_IR_PACKET_TYPE;
use crate::error::{CodecError, ParseContext};
use crate::types::{ContextId, SessionId};

/// Profiles the built-in backend can actually encode.
pub(crate) fn implemented_profiles() -> ProfileSet {
    ProfileSet::empty().with(RohcProfile::Uncompressed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressorState {
    InitializationAndRefresh,
    Normal,
}

#[derive(Debug)]
struct CompressorContext {
    flow: FlowKey,
    profile: RohcProfile,
    state: CompressorState,
    mode: OperatingMode,
    ir_sent: u32,
    packets_since_ir: u32,
}

impl CompressorContext {
    fn new(flow: FlowKey, profile: RohcProfile) -> Self {
        Self {
            flow,
            profile,
            state: CompressorState::InitializationAndRefresh,
            mode: OperatingMode::U,
            ir_sent: 0,
            packets_since_ir: 0,
        }
    }

    fn needs_ir(&self, first_octet: u8, refresh_interval: u32) -> bool {
        // Octets 111xxxxx would be read back as padding, Add-CID, feedback,
        // IR, IR-DYN or segment.
        self.state == CompressorState::InitializationAndRefresh
            || first_octet & 0xE0 == 0xE0
            || (self.mode == OperatingMode::U
                && refresh_interval > 0
                && self.packets_since_ir >= refresh_interval)
    }

    fn restart_ir(&mut self) {
        self.state = CompressorState::InitializationAndRefresh;
        self.ir_sent = 0;
        self.packets_since_ir = 0;
    }
}

#[derive(Debug, Default)]
struct CompressorStats {
    packets: u64,
    ir_packets: u64,
    normal_packets: u64,
    bytes_in: u64,
    bytes_out: u64,
    contexts_created: u64,
    contexts_recycled: u64,
    feedback_piggybacked: u64,
    feedback_delivered: u64,
    feedback_ignored: u64,
    failures: u64,
}

/// Compressor of one codec session.
#[derive(Debug)]
pub struct RohcCompressor {
    session: SessionId,
    cid_type: CidType,
    profiles: ProfileSet,
    ir_refresh_interval: u32,
    ir_repetitions: u32,
    crc: Arc<CrcCalculators>,
    contexts: ContextTable<CompressorContext>,
    flows: HashMap<FlowKey, ContextId>,
    pending_feedback: VecDeque<FeedbackElement>,
    stats: CompressorStats,
}

impl RohcCompressor {
    /// Creates a compressor for `session`.
    ///
    /// The number of contexts is the configured maximum, capped by what the
    /// CID type can address.
    pub fn new(session: SessionId, config: &CompressorConfig, crc: Arc<CrcCalculators>) -> Self {
        let addressable = config.cid_type.max_cid() as usize + 1;
        Self {
            session,
            cid_type: config.cid_type,
            profiles: config.profiles,
            ir_refresh_interval: config.ir_refresh_interval,
            ir_repetitions: config.ir_repetitions.max(1),
            crc,
            contexts: ContextTable::new((config.max_contexts as usize).min(addressable)),
            flows: HashMap::new(),
            pending_feedback: VecDeque::new(),
            stats: CompressorStats::default(),
        }
    }

    /// Number of contexts this compressor may track at once.
    pub fn context_capacity(&self) -> usize {
        self.contexts.capacity()
    }

    fn context_for(&mut self, info: &PayloadInfo, profile: RohcProfile) -> ContextId {
        if let Some(&cid) = self.flows.get(&info.flow) {
            if self.contexts.contains(cid) {
                return cid;
            }
        }

        let (cid, evicted) = self
            .contexts
            .allocate(CompressorContext::new(info.flow, profile));
        self.stats.contexts_created += 1;
        if let Some(old) = evicted {
            self.flows.remove(&old.flow);
            self.stats.contexts_recycled += 1;
            debug!(session = %self.session, %cid, "Recycled least recently used context");
        }
        self.flows.insert(info.flow, cid);
        debug!(session = %self.session, %cid, %profile, "Created compression context");
        cid
    }

    fn write_cid_prefix(
        &self,
        writer: &mut PacketWriter<'_>,
        cid: ContextId,
    ) -> Result<(), CodecError> {
        if self.cid_type == CidType::Small {
            if let Some(octet) = add_cid_octet(cid)? {
                writer.put_u8(octet)?;
            }
        }
        Ok(())
    }

    fn write_large_cid(
        &self,
        writer: &mut PacketWriter<'_>,
        cid: ContextId,
    ) -> Result<(), CodecError> {
        if self.cid_type == CidType::Large {
            writer.put_with(|tail| encode_large_cid(cid, tail))?;
        }
        Ok(())
    }

    /// Writes pending feedback and the packet for `payload` into `out`.
    ///
    /// # Returns
    /// The packet length, the context used and whether an IR packet was sent.
    fn build(
        &mut self,
        payload: &[u8],
        out: &mut [u8],
    ) -> Result<(usize, ContextId, bool), CodecError> {
        if payload.is_empty() {
            return Err(CodecError::EmptyPayload);
        }
        let info = PayloadInfo::inspect(payload);
        let selected = info
            .select(self.profiles, implemented_profiles())
            .ok_or(CodecError::NoProfile)?;
        let cid = self.context_for(&info, selected);
        let refresh_interval = self.ir_refresh_interval;
        let ctx = self
            .contexts
            .get_mut(cid)
            .ok_or(CodecError::ContextNotFound(cid))?;
        let send_ir = ctx.needs_ir(payload[0], refresh_interval);
        let profile = ctx.profile;

        let mut writer = PacketWriter::new(out, ParseContext::CompressedOutput);
        for element in &self.pending_feedback {
            writer.put_with(|tail| element.encode(self.cid_type, tail))?;
        }

        self.write_cid_prefix(&mut writer, cid)?;
        if send_ir {
            let core_start = writer.position();
            writer.put_u8(ROHC_IR_PACKET_TYPE)?;
            self.write_large_cid(&mut writer, cid)?;
            writer.put_u8(u8::from(profile))?;
            let crc = self.crc.crc8(&writer.written()[core_start..]);
            writer.put_u8(crc)?;
            writer.put_slice(payload)?;
        } else {
            writer.put_u8(payload[0])?;
            self.write_large_cid(&mut writer, cid)?;
            writer.put_slice(&payload[1..])?;
        }
        Ok((writer.position(), cid, send_ir))
    }

    fn advance_context(&mut self, cid: ContextId, sent_ir: bool) {
        let repetitions = self.ir_repetitions;
        if let Some(ctx) = self.contexts.get_mut(cid) {
            if sent_ir {
                ctx.ir_sent += 1;
                ctx.packets_since_ir = 0;
                if ctx.mode == OperatingMode::U && ctx.ir_sent >= repetitions {
                    ctx.state = CompressorState::Normal;
                }
            } else {
                ctx.packets_since_ir += 1;
            }
        }
    }
}

impl Compressor for RohcCompressor {
    fn compress(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        match self.build(payload, out) {
            Ok((len, cid, sent_ir)) => {
                self.advance_context(cid, sent_ir);
                self.stats.feedback_piggybacked += self.pending_feedback.len() as u64;
                self.pending_feedback.clear();
                self.stats.packets += 1;
                if sent_ir {
                    self.stats.ir_packets += 1;
                } else {
                    self.stats.normal_packets += 1;
                }
                self.stats.bytes_in += payload.len() as u64;
                self.stats.bytes_out += len as u64;
                trace!(session = %self.session, %cid, ir = sent_ir, len, "Compressed packet");
                Ok(len)
            }
            Err(e) => {
                self.stats.failures += 1;
                Err(e)
            }
        }
    }

    fn piggyback_feedback(&mut self, element: FeedbackElement) {
        trace!(session = %self.session, %element, "Queued feedback for piggybacking");
        self.pending_feedback.push_back(element);
    }

    fn deliver_feedback(&mut self, element: &FeedbackElement) -> Result<(), CodecError> {
        let Some(ctx) = self.contexts.get_mut(element.cid) else {
            self.stats.feedback_ignored += 1;
            return Err(CodecError::ContextNotFound(element.cid));
        };
        match element.ack {
            AckType::Ack => {
                if let Some(mode) = element.mode {
                    ctx.mode = mode;
                }
                if ctx.mode != OperatingMode::U {
                    ctx.state = CompressorState::Normal;
                }
            }
            AckType::Nack | AckType::StaticNack => ctx.restart_ir(),
        }
        self.stats.feedback_delivered += 1;
        debug!(session = %self.session, %element, "Feedback delivered to compressor");
        Ok(())
    }

    fn statistics(&self) -> Vec<Statistic> {
        let s = &self.stats;
        vec![
            Statistic::new("packets", s.packets),
            Statistic::new("ir_packets", s.ir_packets),
            Statistic::new("normal_packets", s.normal_packets),
            Statistic::new("bytes_in", s.bytes_in),
            Statistic::new("bytes_out", s.bytes_out),
            Statistic::new("contexts_created", s.contexts_created),
            Statistic::new("contexts_recycled", s.contexts_recycled),
            Statistic::new("contexts_active", self.contexts.len() as u64),
            Statistic::new("feedback_piggybacked", s.feedback_piggybacked),
            Statistic::new("feedback_delivered", s.feedback_delivered),
            Statistic::new("feedback_ignored", s.feedback_ignored),
            Statistic::new("failures", s.failures),
        ]
    }
}
