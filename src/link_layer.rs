//! Link-layer classification of capture flows.
//!
//! A flow's link type is validated once at startup; every frame of the flow then
//! shares the same header length. Unsupported link types are configuration errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DLT_RAW_ALIASES, ETHER_FRAME_MIN_LEN, ETHER_HDR_LEN, LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL,
    LINKTYPE_RAW, LINUX_COOKED_HDR_LEN, ROHC_LINK_TYPE_MARKER,
};
use crate::error::HarnessError;

/// Link layers the harness knows how to strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkLayerType {
    /// Standard Ethernet II framing; short frames are padded to 60 bytes.
    Ethernet,
    /// Linux cooked-mode capture (SLL).
    LinuxCooked,
    /// Raw IP, no link-layer header.
    Raw,
}

impl LinkLayerType {
    /// Classifies a PCAP link type.
    ///
    /// # Errors
    /// - [`HarnessError::UnsupportedLinkType`] - The link type cannot be stripped
    pub fn from_linktype(linktype: i32, flow: &'static str) -> Result<Self, HarnessError> {
        match linktype {
            LINKTYPE_ETHERNET => Ok(LinkLayerType::Ethernet),
            LINKTYPE_LINUX_SLL => Ok(LinkLayerType::LinuxCooked),
            LINKTYPE_RAW => Ok(LinkLayerType::Raw),
            other if DLT_RAW_ALIASES.contains(&other) => Ok(LinkLayerType::Raw),
            other => Err(HarnessError::UnsupportedLinkType {
                linktype: other,
                flow,
            }),
        }
    }

    /// PCAP link type written to output flows.
    pub const fn linktype(self) -> i32 {
        match self {
            LinkLayerType::Ethernet => LINKTYPE_ETHERNET,
            LinkLayerType::LinuxCooked => LINKTYPE_LINUX_SLL,
            LinkLayerType::Raw => LINKTYPE_RAW,
        }
    }

    /// Offset at which the network-layer payload starts.
    pub const fn header_len(self) -> usize {
        match self {
            LinkLayerType::Ethernet => ETHER_HDR_LEN,
            LinkLayerType::LinuxCooked => LINUX_COOKED_HDR_LEN,
            LinkLayerType::Raw => 0,
        }
    }

    /// Whether short frames of this link type carry trailing padding.
    pub const fn pads_short_frames(self) -> bool {
        matches!(self, LinkLayerType::Ethernet)
    }

    /// Frame length at which padding may be present, if the link type pads.
    pub const fn min_frame_len(self) -> Option<usize> {
        match self {
            LinkLayerType::Ethernet => Some(ETHER_FRAME_MIN_LEN),
            LinkLayerType::LinuxCooked | LinkLayerType::Raw => None,
        }
    }

    /// Overwrites the protocol type field of a copied link-layer header with the
    /// ROHC marker.
    ///
    /// The Ethernet EtherType carries the marker in host byte order, which is how
    /// historical reference captures were produced; the cooked header stores it
    /// in network order. Raw flows have no header and are left untouched.
    pub fn rewrite_header_marker(self, header: &mut [u8]) {
        debug_assert_eq!(header.len(), self.header_len());
        match self {
            LinkLayerType::Ethernet => {
                header[ETHER_HDR_LEN - 2..ETHER_HDR_LEN]
                    .copy_from_slice(&ROHC_LINK_TYPE_MARKER.to_le_bytes());
            }
            LinkLayerType::LinuxCooked => {
                header[LINUX_COOKED_HDR_LEN - 2..LINUX_COOKED_HDR_LEN]
                    .copy_from_slice(&ROHC_LINK_TYPE_MARKER.to_be_bytes());
            }
            LinkLayerType::Raw => {}
        }
    }
}

impl fmt::Display for LinkLayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkLayerType::Ethernet => f.write_str("ethernet"),
            LinkLayerType::LinuxCooked => f.write_str("linux-cooked"),
            LinkLayerType::Raw => f.write_str("raw"),
        }
    }
}
