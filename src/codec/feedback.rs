//! ROHC feedback elements (RFC 3095, Section 5.2.2 and 5.7.6).
//!
//! A feedback element is `11110ccc [size] data`. When the code `ccc` is zero a
//! size octet follows; otherwise the code is the data size. The data starts with
//! the CID of the context the feedback is about, followed by either FEEDBACK-1
//! (one octet of SN) or FEEDBACK-2 (`ACKTYPE(2) MODE(2) SN(12)` plus options).

use std::fmt;

use serde::Serialize;

use super::cid::{CidType, add_cid_octet, add_cid_value, decode_large_cid, encode_large_cid};
use crate::constants::{ROHC_FEEDBACK_CODE_MASK, ROHC_FEEDBACK_PREFIX};
use crate::error::{ParseContext, RohcBuildingError, RohcParsingError};
use crate::types::ContextId;

/// Acknowledgement carried by a feedback element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AckType {
    Ack = 0,
    Nack = 1,
    StaticNack = 2,
}

impl TryFrom<u8> for AckType {
    type Error = RohcParsingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AckType::Ack),
            1 => Ok(AckType::Nack),
            2 => Ok(AckType::StaticNack),
            other => Err(RohcParsingError::InvalidPacketType {
                discriminator: other,
                profile_id: None,
            }),
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckType::Ack => f.write_str("ACK"),
            AckType::Nack => f.write_str("NACK"),
            AckType::StaticNack => f.write_str("STATIC-NACK"),
        }
    }
}

/// Mode the decompressor asks the compressor to operate in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperatingMode {
    /// Unidirectional.
    U = 1,
    /// Bidirectional optimistic.
    O = 2,
    /// Bidirectional reliable.
    R = 3,
}

impl OperatingMode {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(OperatingMode::U),
            2 => Some(OperatingMode::O),
            3 => Some(OperatingMode::R),
            _ => None,
        }
    }
}

/// One decoded feedback element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FeedbackElement {
    pub cid: ContextId,
    pub ack: AckType,
    /// Requested mode; `None` for FEEDBACK-1 or a zero mode field.
    pub mode: Option<OperatingMode>,
    /// Least significant bits of the sequence number being acknowledged.
    pub sn: u16,
}

impl FeedbackElement {
    /// Creates a FEEDBACK-2 element requesting optimistic mode.
    pub fn new(cid: ContextId, ack: AckType, sn: u16) -> Self {
        Self {
            cid,
            ack,
            mode: Some(OperatingMode::O),
            sn: sn & 0x0FFF,
        }
    }

    fn data_len(&self, cid_type: CidType) -> usize {
        cid_type.encoded_len(self.cid) + 2
    }

    /// Total encoded size, header included.
    pub fn encoded_len(&self, cid_type: CidType) -> usize {
        let data = self.data_len(cid_type);
        if data <= ROHC_FEEDBACK_CODE_MASK as usize {
            1 + data
        } else {
            2 + data
        }
    }

    /// Writes the element into `out`, returning the number of bytes written.
    ///
    /// # Errors
    /// - [`RohcBuildingError::BufferTooSmall`] - `out` cannot hold the element
    /// - [`RohcBuildingError::CidOutOfRange`] - CID not encodable with `cid_type`
    pub fn encode(&self, cid_type: CidType, out: &mut [u8]) -> Result<usize, RohcBuildingError> {
        let total = self.encoded_len(cid_type);
        if out.len() < total {
            return Err(RohcBuildingError::BufferTooSmall {
                needed: total,
                available: out.len(),
                context: ParseContext::FeedbackElement,
            });
        }
        let data = self.data_len(cid_type);
        let mut pos = if data <= ROHC_FEEDBACK_CODE_MASK as usize {
            out[0] = ROHC_FEEDBACK_PREFIX | data as u8;
            1
        } else {
            out[0] = ROHC_FEEDBACK_PREFIX;
            out[1] = u8::try_from(data).map_err(|_| RohcBuildingError::FeedbackTooLarge { size: data })?;
            2
        };

        match cid_type {
            CidType::Small => {
                if let Some(octet) = add_cid_octet(self.cid)? {
                    out[pos] = octet;
                    pos += 1;
                }
            }
            CidType::Large => pos += encode_large_cid(self.cid, &mut out[pos..])?,
        }

        let mode_bits = self.mode.map_or(0, |m| m as u8);
        let sn = self.sn & 0x0FFF;
        out[pos] = ((self.ack as u8) << 6) | (mode_bits << 4) | (sn >> 8) as u8;
        out[pos + 1] = sn as u8;
        Ok(pos + 2)
    }
}

impl fmt::Display for FeedbackElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {} (SN {})", self.ack, self.cid, self.sn)
    }
}

/// Whether `octet` starts a feedback element.
#[inline]
pub fn is_feedback_octet(octet: u8) -> bool {
    octet & 0xF8 == ROHC_FEEDBACK_PREFIX
}

/// Size of the feedback header (type octet plus optional size octet).
pub fn feedback_header_size(element: &[u8]) -> Option<usize> {
    let first = *element.first()?;
    if first & ROHC_FEEDBACK_CODE_MASK == 0 {
        Some(2)
    } else {
        Some(1)
    }
}

/// Size of the feedback data following the header.
pub fn feedback_size(element: &[u8]) -> Option<usize> {
    let code = element.first()? & ROHC_FEEDBACK_CODE_MASK;
    if code == 0 {
        element.get(1).map(|&size| size as usize)
    } else {
        Some(code as usize)
    }
}

/// Total length of the feedback element at the start of `element`, or `None`
/// when the element is truncated.
pub fn feedback_total_len(element: &[u8]) -> Option<usize> {
    let total = feedback_header_size(element)? + feedback_size(element)?;
    (total <= element.len()).then_some(total)
}

/// Parses the feedback element at the start of `data`.
///
/// Returns the element and the number of bytes it occupies.
///
/// # Errors
/// - [`RohcParsingError::NotEnoughData`] - Element truncated or without data
/// - [`RohcParsingError::InvalidPacketType`] - Reserved acknowledgement type
pub fn parse_feedback(
    data: &[u8],
    cid_type: CidType,
) -> Result<(FeedbackElement, usize), RohcParsingError> {
    let header = feedback_header_size(data).ok_or(RohcParsingError::NotEnoughData {
        needed: 1,
        got: 0,
        context: ParseContext::FeedbackElement,
    })?;
    let size = feedback_size(data).ok_or(RohcParsingError::NotEnoughData {
        needed: 2,
        got: data.len(),
        context: ParseContext::FeedbackElement,
    })?;
    let total = header + size;
    if data.len() < total {
        return Err(RohcParsingError::NotEnoughData {
            needed: total,
            got: data.len(),
            context: ParseContext::FeedbackElement,
        });
    }

    let body = &data[header..total];
    let (cid, cid_len) = match cid_type {
        CidType::Small => match body.first().and_then(|&b| add_cid_value(b)) {
            Some(cid) => (cid, 1),
            None => (ContextId::new(0), 0),
        },
        CidType::Large => decode_large_cid(body)?,
    };

    let fb = &body[cid_len..];
    let element = match fb.len() {
        0 => {
            return Err(RohcParsingError::NotEnoughData {
                needed: cid_len + 1,
                got: body.len(),
                context: ParseContext::FeedbackData,
            });
        }
        1 => FeedbackElement {
            cid,
            ack: AckType::Ack,
            mode: None,
            sn: fb[0] as u16,
        },
        _ => FeedbackElement {
            cid,
            ack: AckType::try_from(fb[0] >> 6)?,
            mode: OperatingMode::from_bits((fb[0] >> 4) & 0x03),
            sn: (((fb[0] & 0x0F) as u16) << 8) | fb[1] as u16,
        },
    };
    Ok((element, total))
}
