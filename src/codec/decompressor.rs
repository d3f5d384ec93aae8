//! Built-in ROHC decompressor.
//!
//! Handles the packets produced by [`RohcCompressor`](super::compressor::RohcCompressor):
//! leading padding and piggybacked feedback, Add-CID or large CID, IR packets
//! validated with CRC-8 and Uncompressed-profile normal packets.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::cid::{CidType, add_cid_value, decode_large_cid};
use super::context_manager::ContextTable;
use super::crc::CrcCalculators;
use super::feedback::{AckType, FeedbackElement, is_feedback_octet, parse_feedback};
use super::profile::RohcProfile;
use super::writer::PacketWriter;
use super::{DecompressorConfig, Decompressor, FeedbackBatch, Statistic};
use crate::constants::{
    ROHC_IR_DYN_PACKET_TYPE, ROHC_IR_PACKET_TYPE, ROHC_PADDING_OCTET, ROHC_SEGMENT_PREFIX,
};
use crate::error::{CodecError, CrcType, ParseContext, RohcParsingError};
use crate::types::{ContextId, SessionId};

#[derive(Debug)]
struct DecompressorContext {
    profile: RohcProfile,
    packets: u16,
}

#[derive(Debug, Default)]
struct DecompressorStats {
    packets: u64,
    ir_packets: u64,
    normal_packets: u64,
    bytes_in: u64,
    bytes_out: u64,
    contexts_created: u64,
    feedback_received: u64,
    feedback_sent: u64,
    crc_failures: u64,
    failures: u64,
}

/// Decompressor of one codec session.
#[derive(Debug)]
pub struct RohcDecompressor {
    session: SessionId,
    cid_type: CidType,
    crc: Arc<CrcCalculators>,
    contexts: ContextTable<DecompressorContext>,
    stats: DecompressorStats,
}

/// CID and position of the core packet inside a ROHC unit.
struct CoreHeader {
    cid: ContextId,
    /// Offset of the packet type octet.
    type_pos: usize,
    /// Offset of the first octet after the large CID (equal to `type_pos + 1`
    /// for small CIDs).
    after_cid: usize,
}

impl RohcDecompressor {
    pub fn new(
        session: SessionId,
        config: &DecompressorConfig,
        crc: Arc<CrcCalculators>,
    ) -> Self {
        let addressable = config.cid_type.max_cid() as usize + 1;
        Self {
            session,
            cid_type: config.cid_type,
            crc,
            contexts: ContextTable::new((config.max_contexts as usize).min(addressable)),
            stats: DecompressorStats::default(),
        }
    }

    fn send(&mut self, feedback: &mut FeedbackBatch, cid: ContextId, ack: AckType) {
        let sn = self.contexts.get(cid).map_or(0, |ctx| ctx.packets);
        let element = FeedbackElement::new(cid, ack, sn);
        trace!(session = %self.session, %element, "Decompressor emits feedback");
        self.stats.feedback_sent += 1;
        feedback.to_send.push(element);
    }

    /// Skips padding and collects piggybacked feedback, returning the offset of
    /// the first octet of the compressed header.
    fn strip_feedback(
        &mut self,
        packet: &[u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, RohcParsingError> {
        let mut pos = 0;
        while let Some(&octet) = packet.get(pos) {
            if octet == ROHC_PADDING_OCTET {
                pos += 1;
            } else if is_feedback_octet(octet) {
                let (element, used) = parse_feedback(&packet[pos..], self.cid_type)?;
                trace!(session = %self.session, %element, "Extracted piggybacked feedback");
                self.stats.feedback_received += 1;
                feedback.received.push(element);
                pos += used;
            } else {
                break;
            }
        }
        Ok(pos)
    }

    fn parse_cid(&self, packet: &[u8], mut pos: usize) -> Result<CoreHeader, RohcParsingError> {
        let mut cid = ContextId::new(0);
        if self.cid_type == CidType::Small {
            if let Some(small) = add_cid_value(packet[pos]) {
                cid = small;
                pos += 1;
            }
        }
        if pos >= packet.len() {
            return Err(RohcParsingError::NotEnoughData {
                needed: pos + 1,
                got: packet.len(),
                context: ParseContext::CorePacketAfterCid,
            });
        }
        let after_cid = match self.cid_type {
            CidType::Small => pos + 1,
            CidType::Large => {
                let (large, used) = decode_large_cid(&packet[pos + 1..])?;
                cid = large;
                pos + 1 + used
            }
        };
        Ok(CoreHeader {
            cid,
            type_pos: pos,
            after_cid,
        })
    }

    fn decompress_ir(
        &mut self,
        packet: &[u8],
        header: &CoreHeader,
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        let cid = header.cid;
        let profile_pos = header.after_cid;
        let crc_pos = profile_pos + 1;
        if packet.len() <= crc_pos {
            return Err(RohcParsingError::NotEnoughData {
                needed: crc_pos + 1,
                got: packet.len(),
                context: ParseContext::IrHeader,
            }
            .into());
        }

        let calculated = self.crc.crc8(&packet[header.type_pos..crc_pos]);
        if calculated != packet[crc_pos] {
            self.stats.crc_failures += 1;
            warn!(session = %self.session, %cid, "IR header CRC check failed");
            self.send(feedback, cid, AckType::StaticNack);
            return Err(RohcParsingError::CrcMismatch {
                expected: packet[crc_pos],
                calculated,
                crc_type: CrcType::Crc8,
            }
            .into());
        }

        let profile = RohcProfile::from(packet[profile_pos]);
        if profile != RohcProfile::Uncompressed {
            self.send(feedback, cid, AckType::StaticNack);
            return Err(CodecError::UnsupportedProfile(u8::from(profile)));
        }
        if cid.value() as usize >= self.contexts.capacity() {
            self.send(feedback, cid, AckType::StaticNack);
            return Err(CodecError::ContextNotFound(cid));
        }

        let mut writer = PacketWriter::new(out, ParseContext::DecompressedOutput);
        writer.put_slice(&packet[crc_pos + 1..])?;

        let created = self
            .contexts
            .insert(cid, DecompressorContext { profile, packets: 1 })
            .is_none();
        if created {
            self.stats.contexts_created += 1;
            debug!(session = %self.session, %cid, %profile, "Created decompression context");
        }
        self.stats.ir_packets += 1;
        self.send(feedback, cid, AckType::Ack);
        Ok(writer.position())
    }

    fn decompress_normal(
        &mut self,
        packet: &[u8],
        header: &CoreHeader,
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        let cid = header.cid;
        let first = packet[header.type_pos];
        let Some(ctx) = self.contexts.get_mut(cid) else {
            self.send(feedback, cid, AckType::StaticNack);
            return Err(CodecError::ContextNotFound(cid));
        };
        if ctx.profile != RohcProfile::Uncompressed || first & 0xE0 == 0xE0 {
            let profile_id = Some(u8::from(ctx.profile));
            return Err(RohcParsingError::InvalidPacketType {
                discriminator: first,
                profile_id,
            }
            .into());
        }
        ctx.packets = ctx.packets.wrapping_add(1) & 0x0FFF;

        let mut writer = PacketWriter::new(out, ParseContext::DecompressedOutput);
        writer.put_u8(first)?;
        writer.put_slice(packet.get(header.after_cid..).unwrap_or_default())?;
        self.stats.normal_packets += 1;
        Ok(writer.position())
    }

    fn decompress_unit(
        &mut self,
        packet: &[u8],
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        if packet.is_empty() {
            return Err(RohcParsingError::NotEnoughData {
                needed: 1,
                got: 0,
                context: ParseContext::RohcPacketInput,
            }
            .into());
        }
        let start = self.strip_feedback(packet, feedback)?;
        if start == packet.len() {
            // Feedback-only unit: nothing to rebuild.
            return Ok(0);
        }
        if packet[start] & 0xFE == ROHC_SEGMENT_PREFIX {
            return Err(RohcParsingError::SegmentNotSupported.into());
        }

        let header = self.parse_cid(packet, start)?;
        let packet_type = packet[header.type_pos];
        if packet_type & 0xFE == ROHC_IR_PACKET_TYPE {
            self.decompress_ir(packet, &header, out, feedback)
        } else if packet_type == ROHC_IR_DYN_PACKET_TYPE {
            Err(RohcParsingError::InvalidPacketType {
                discriminator: packet_type,
                profile_id: self.contexts.get(header.cid).map(|ctx| u8::from(ctx.profile)),
            }
            .into())
        } else {
            self.decompress_normal(packet, &header, out, feedback)
        }
    }
}

impl Decompressor for RohcDecompressor {
    fn decompress(
        &mut self,
        packet: &[u8],
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        self.stats.packets += 1;
        self.stats.bytes_in += packet.len() as u64;
        match self.decompress_unit(packet, out, feedback) {
            Ok(len) => {
                self.stats.bytes_out += len as u64;
                Ok(len)
            }
            Err(e) => {
                self.stats.failures += 1;
                Err(e)
            }
        }
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
            Statistic::new("contexts_active", self.contexts.len() as u64),
            Statistic::new("feedback_received", s.feedback_received),
            Statistic::new("feedback_sent", s.feedback_sent),
            Statistic::new("crc_failures", s.crc_failures),
            Statistic::new("failures", s.failures),
        ]
    }
}
