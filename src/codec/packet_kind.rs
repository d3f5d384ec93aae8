//! Classification of compressed units by their first octets.
//!
//! Used to annotate each compressed unit in the report. The rules follow RFC 3095,
//! Section 5.7: leading feedback and padding are skipped, then the CID is
//! consumed and the packet type is read from the first core octet.

use std::fmt;

use serde::Serialize;

use super::cid::{CidType, add_cid_value};
use super::feedback::{feedback_total_len, is_feedback_octet};
use crate::constants::{
    ROHC_IR_DYN_PACKET_TYPE, ROHC_IR_PACKET_TYPE, ROHC_PADDING_OCTET, ROHC_SEGMENT_PREFIX,
};

/// Packet type of a ROHC unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PacketKind {
    /// Only feedback elements, no compressed header.
    Feedback,
    /// Only padding octets.
    Padding,
    Segment,
    Ir,
    IrDyn,
    Uo0,
    Uo1,
    Uo1Ts,
    Uor2,
    Uor2Ts,
    /// First core octet matches no known packet type.
    Unknown,
}

#[inline]
fn is_segment(octet: u8) -> bool {
    octet & 0xFE == ROHC_SEGMENT_PREFIX
}

#[inline]
fn is_ir(octet: u8) -> bool {
    octet & 0xFE == ROHC_IR_PACKET_TYPE
}

impl PacketKind {
    /// Classifies a complete compressed unit.
    ///
    /// Returns `None` for an empty unit or when a feedback element or the large
    /// CID field is truncated.
    pub fn classify(unit: &[u8], cid_type: CidType) -> Option<Self> {
        let mut pos = 0;
        let mut saw_feedback = false;
        let mut saw_padding = false;

        while let Some(&octet) = unit.get(pos) {
            if octet == ROHC_PADDING_OCTET {
                saw_padding = true;
                pos += 1;
            } else if is_feedback_octet(octet) {
                saw_feedback = true;
                pos += feedback_total_len(&unit[pos..])?;
            } else {
                break;
            }
        }

        if pos >= unit.len() {
            return match (saw_feedback, saw_padding) {
                (true, _) => Some(PacketKind::Feedback),
                (false, true) => Some(PacketKind::Padding),
                (false, false) => None,
            };
        }

        if cid_type == CidType::Small && add_cid_value(unit[pos]).is_some() {
            pos += 1;
        }
        let first = *unit.get(pos)?;
        // Large CID sits after the first octet; only UOR-2 reads past it here.
        let after_cid = match cid_type {
            CidType::Large => {
                let sdvl = *unit.get(pos + 1)?;
                pos + 1 + if sdvl & 0x80 == 0 { 1 } else { 2 }
            }
            CidType::Small => pos + 1,
        };

        let kind = if is_segment(first) {
            PacketKind::Segment
        } else if is_ir(first) {
            PacketKind::Ir
        } else if first == ROHC_IR_DYN_PACKET_TYPE {
            PacketKind::IrDyn
        } else if first & 0x80 == 0 {
            PacketKind::Uo0
        } else if first & 0xC0 == 0x80 {
            if first & 0x20 != 0 {
                PacketKind::Uo1Ts
            } else {
                PacketKind::Uo1
            }
        } else if first & 0xE0 == 0xC0 {
            match unit.get(after_cid) {
                Some(next) if next & 0x80 != 0 => PacketKind::Uor2Ts,
                _ => PacketKind::Uor2,
            }
        } else {
            PacketKind::Unknown
        };
        Some(kind)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Feedback => "feedback",
            PacketKind::Padding => "padding",
            PacketKind::Segment => "segment",
            PacketKind::Ir => "IR",
            PacketKind::IrDyn => "IR-DYN",
            PacketKind::Uo0 => "UO-0",
            PacketKind::Uo1 => "UO-1",
            PacketKind::Uo1Ts => "UO-1-TS",
            PacketKind::Uor2 => "UOR-2",
            PacketKind::Uor2Ts => "UOR-2-TS",
            PacketKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
