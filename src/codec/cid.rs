//! Context identifier encoding (RFC 3095, Section 5.2.3).
//!
//! Small CIDs travel in an Add-CID octet placed before the packet (CID 0 is
//! implicit). Large CIDs travel as a self-describing variable-length (SDVL)
//! field after the first octet of the packet.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ROHC_ADD_CID_PREFIX, ROHC_ADD_CID_PREFIX_MASK, ROHC_LARGE_CID_MAX, ROHC_PADDING_OCTET,
    ROHC_SMALL_CID_MASK, ROHC_SMALL_CID_MAX,
};
use crate::error::{HarnessError, ParseContext, RohcBuildingError, RohcParsingError};
use crate::types::ContextId;

/// Context identifier width used for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CidType {
    /// CIDs 0 to 15 signalled through Add-CID octets.
    #[default]
    Small,
    /// CIDs 0 to 16383 signalled through SDVL fields.
    Large,
}

impl CidType {
    /// Largest CID this type can encode.
    pub const fn max_cid(self) -> u16 {
        match self {
            CidType::Small => ROHC_SMALL_CID_MAX,
            CidType::Large => ROHC_LARGE_CID_MAX,
        }
    }

    /// Number of bytes the CID occupies on the wire.
    pub fn encoded_len(self, cid: ContextId) -> usize {
        match self {
            CidType::Small if cid.0 == 0 => 0,
            CidType::Small => 1,
            CidType::Large if cid.0 < 128 => 1,
            CidType::Large => 2,
        }
    }
}

impl FromStr for CidType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smallcid" => Ok(CidType::Small),
            "largecid" => Ok(CidType::Large),
            other => Err(HarnessError::InvalidCidType(other.to_string())),
        }
    }
}

impl fmt::Display for CidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CidType::Small => f.write_str("smallcid"),
            CidType::Large => f.write_str("largecid"),
        }
    }
}

/// Returns the small CID carried by `octet` if it is an Add-CID octet.
///
/// The padding octet shares the Add-CID prefix and is never a CID.
#[inline]
pub fn add_cid_value(octet: u8) -> Option<ContextId> {
    if octet != ROHC_PADDING_OCTET && (octet & ROHC_ADD_CID_PREFIX_MASK) == ROHC_ADD_CID_PREFIX {
        Some(ContextId::new((octet & ROHC_SMALL_CID_MASK) as u16))
    } else {
        None
    }
}

/// Builds the Add-CID octet for a small CID, or `None` for the implicit CID 0.
///
/// # Errors
/// - [`RohcBuildingError::CidOutOfRange`] - CID above 15
pub fn add_cid_octet(cid: ContextId) -> Result<Option<u8>, RohcBuildingError> {
    if cid.0 > ROHC_SMALL_CID_MAX {
        return Err(RohcBuildingError::CidOutOfRange {
            cid,
            max: ROHC_SMALL_CID_MAX,
        });
    }
    if cid.0 == 0 {
        Ok(None)
    } else {
        Ok(Some(ROHC_ADD_CID_PREFIX | cid.0 as u8))
    }
}

/// Encodes a large CID as SDVL into `out`, returning the number of bytes written.
///
/// # Errors
/// - [`RohcBuildingError::CidOutOfRange`] - CID above 16383
/// - [`RohcBuildingError::BufferTooSmall`] - `out` cannot hold the field
pub fn encode_large_cid(cid: ContextId, out: &mut [u8]) -> Result<usize, RohcBuildingError> {
    let needed = CidType::Large.encoded_len(cid);
    if cid.0 > ROHC_LARGE_CID_MAX {
        return Err(RohcBuildingError::CidOutOfRange {
            cid,
            max: ROHC_LARGE_CID_MAX,
        });
    }
    if out.len() < needed {
        return Err(RohcBuildingError::BufferTooSmall {
            needed,
            available: out.len(),
            context: ParseContext::LargeCid,
        });
    }
    if needed == 1 {
        out[0] = cid.0 as u8;
    } else {
        let value = 0x8000 | cid.0;
        out[..2].copy_from_slice(&value.to_be_bytes());
    }
    Ok(needed)
}

/// Decodes an SDVL large CID, returning the CID and the number of bytes consumed.
///
/// # Errors
/// - [`RohcParsingError::NotEnoughData`] - Field truncated
/// - [`RohcParsingError::InvalidLargeCid`] - Prefix reserved for longer SDVL values
pub fn decode_large_cid(data: &[u8]) -> Result<(ContextId, usize), RohcParsingError> {
    let first = *data.first().ok_or(RohcParsingError::NotEnoughData {
        needed: 1,
        got: 0,
        context: ParseContext::LargeCid,
    })?;
    if first & 0x80 == 0 {
        return Ok((ContextId::new(first as u16), 1));
    }
    if first & 0xC0 != 0x80 {
        return Err(RohcParsingError::InvalidLargeCid(first));
    }
    let second = *data.get(1).ok_or(RohcParsingError::NotEnoughData {
        needed: 2,
        got: data.len(),
        context: ParseContext::LargeCid,
    })?;
    let value = u16::from_be_bytes([first & 0x3F, second]);
    Ok((ContextId::new(value), 2))
}
