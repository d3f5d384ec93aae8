//! ROHC profiles, the enabled-profile set and per-packet profile selection.
//!
//! A payload is inspected just far enough to pick its candidate profiles and the
//! flow it belongs to. The first candidate that is both enabled and implemented
//! wins; Uncompressed is always the last resort.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::constants::{
    IP_PROTOCOL_UDP, IP_PROTOCOL_UDP_LITE, IPV4_MIN_HEADER_LEN, IPV6_BASE_HEADER_LEN,
    PROFILE_ID_IP_ONLY, PROFILE_ID_RTP_UDP_IP, PROFILE_ID_UDP_IP, PROFILE_ID_UDP_LITE_IP,
    PROFILE_ID_UNCOMPRESSED, RTP_MIN_HEADER_LEN, RTP_VERSION, UDP_HEADER_LEN,
};

/// Supported ROHC profile identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RohcProfile {
    /// Uncompressed (profile 0x0000)
    Uncompressed,
    /// RTP/UDP/IP (profile 0x0001)
    RtpUdpIp,
    /// UDP/IP (profile 0x0002)
    UdpIp,
    /// IP-only (profile 0x0004)
    Ip,
    /// UDP-Lite/IP (profile 0x0008)
    UdpLiteIp,
    /// Unknown or unsupported profile
    Unknown(u8),
}

impl From<u8> for RohcProfile {
    fn from(value: u8) -> Self {
        match value {
            PROFILE_ID_UNCOMPRESSED => RohcProfile::Uncompressed,
            PROFILE_ID_RTP_UDP_IP => RohcProfile::RtpUdpIp,
            PROFILE_ID_UDP_IP => RohcProfile::UdpIp,
            PROFILE_ID_IP_ONLY => RohcProfile::Ip,
            PROFILE_ID_UDP_LITE_IP => RohcProfile::UdpLiteIp,
            unknown_id => RohcProfile::Unknown(unknown_id),
        }
    }
}

impl From<RohcProfile> for u8 {
    fn from(profile: RohcProfile) -> Self {
        match profile {
            RohcProfile::Uncompressed => PROFILE_ID_UNCOMPRESSED,
            RohcProfile::RtpUdpIp => PROFILE_ID_RTP_UDP_IP,
            RohcProfile::UdpIp => PROFILE_ID_UDP_IP,
            RohcProfile::Ip => PROFILE_ID_IP_ONLY,
            RohcProfile::UdpLiteIp => PROFILE_ID_UDP_LITE_IP,
            RohcProfile::Unknown(val) => val,
        }
    }
}

impl RohcProfile {
    /// Profiles known to the harness, in the order they are reported.
    pub const KNOWN: [RohcProfile; 5] = [
        RohcProfile::Uncompressed,
        RohcProfile::RtpUdpIp,
        RohcProfile::UdpIp,
        RohcProfile::Ip,
        RohcProfile::UdpLiteIp,
    ];

    fn bit(self) -> Option<u16> {
        match self {
            RohcProfile::Uncompressed => Some(1 << 0),
            RohcProfile::RtpUdpIp => Some(1 << 1),
            RohcProfile::UdpIp => Some(1 << 2),
            RohcProfile::Ip => Some(1 << 3),
            RohcProfile::UdpLiteIp => Some(1 << 4),
            RohcProfile::Unknown(_) => None,
        }
    }
}

impl fmt::Display for RohcProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RohcProfile::Uncompressed => f.write_str("Uncompressed"),
            RohcProfile::RtpUdpIp => f.write_str("RTP/UDP/IP"),
            RohcProfile::UdpIp => f.write_str("UDP/IP"),
            RohcProfile::Ip => f.write_str("IP-only"),
            RohcProfile::UdpLiteIp => f.write_str("UDP-Lite/IP"),
            RohcProfile::Unknown(id) => write!(f, "unknown (0x{id:02X})"),
        }
    }
}

/// A set of ROHC profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProfileSet(u16);

impl ProfileSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every profile the harness enables on both sessions.
    pub fn all() -> Self {
        RohcProfile::KNOWN
            .into_iter()
            .fold(Self::empty(), ProfileSet::with)
    }

    /// Returns the set with `profile` added. Unknown profiles are ignored.
    pub fn with(self, profile: RohcProfile) -> Self {
        Self(self.0 | profile.bit().unwrap_or(0))
    }

    pub fn contains(self, profile: RohcProfile) -> bool {
        profile.bit().is_some_and(|bit| self.0 & bit != 0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Profiles in the set, in reporting order.
    pub fn iter(self) -> impl Iterator<Item = RohcProfile> {
        RohcProfile::KNOWN
            .into_iter()
            .filter(move |profile| self.contains(*profile))
    }
}

impl fmt::Display for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, profile) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{profile}")?;
        }
        Ok(())
    }
}

/// Identifies the flow a payload belongs to; one compression context per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKey {
    Ip {
        src: IpAddr,
        dst: IpAddr,
        protocol: u8,
        ports: Option<(u16, u16)>,
    },
    /// Anything that is not a parsable IPv4/IPv6 packet.
    NonIp,
}

/// What profile selection needs to know about a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadInfo {
    pub flow: FlowKey,
    /// Candidate profiles, most specific first.
    pub candidates: &'static [RohcProfile],
}

const RTP_CHAIN: &[RohcProfile] = &[
    RohcProfile::RtpUdpIp,
    RohcProfile::UdpIp,
    RohcProfile::Ip,
    RohcProfile::Uncompressed,
];
const UDP_CHAIN: &[RohcProfile] = &[RohcProfile::UdpIp, RohcProfile::Ip, RohcProfile::Uncompressed];
const UDP_LITE_CHAIN: &[RohcProfile] = &[
    RohcProfile::UdpLiteIp,
    RohcProfile::Ip,
    RohcProfile::Uncompressed,
];
const IP_CHAIN: &[RohcProfile] = &[RohcProfile::Ip, RohcProfile::Uncompressed];
const NON_IP_CHAIN: &[RohcProfile] = &[RohcProfile::Uncompressed];

impl PayloadInfo {
    /// Inspects the network-layer payload.
    pub fn inspect(payload: &[u8]) -> Self {
        let Some((src, dst, protocol, l4_offset)) = parse_ip_header(payload) else {
            return Self {
                flow: FlowKey::NonIp,
                candidates: NON_IP_CHAIN,
            };
        };

        let transport = &payload[l4_offset..];
        let ports = match protocol {
            IP_PROTOCOL_UDP | IP_PROTOCOL_UDP_LITE if transport.len() >= UDP_HEADER_LEN => Some((
                u16::from_be_bytes([transport[0], transport[1]]),
                u16::from_be_bytes([transport[2], transport[3]]),
            )),
            _ => None,
        };

        let candidates = match (protocol, ports) {
            (IP_PROTOCOL_UDP, Some(_)) if looks_like_rtp(&transport[UDP_HEADER_LEN..]) => {
                RTP_CHAIN
            }
            (IP_PROTOCOL_UDP, Some(_)) => UDP_CHAIN,
            (IP_PROTOCOL_UDP_LITE, Some(_)) => UDP_LITE_CHAIN,
            _ => IP_CHAIN,
        };

        Self {
            flow: FlowKey::Ip {
                src,
                dst,
                protocol,
                ports,
            },
            candidates,
        }
    }

    /// Picks the first candidate that is both enabled and implemented.
    pub fn select(&self, enabled: ProfileSet, implemented: ProfileSet) -> Option<RohcProfile> {
        self.candidates
            .iter()
            .copied()
            .find(|profile| enabled.contains(*profile) && implemented.contains(*profile))
    }
}

fn parse_ip_header(packet: &[u8]) -> Option<(IpAddr, IpAddr, u8, usize)> {
    match packet.first()? >> 4 {
        4 => {
            let ihl = ((packet[0] & 0x0F) as usize) * 4;
            if ihl < IPV4_MIN_HEADER_LEN || packet.len() < ihl {
                return None;
            }
            let src = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
            let dst = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);
            Some((src.into(), dst.into(), packet[9], ihl))
        }
        6 => {
            if packet.len() < IPV6_BASE_HEADER_LEN {
                return None;
            }
            let src: [u8; 16] = packet[8..24].try_into().ok()?;
            let dst: [u8; 16] = packet[24..40].try_into().ok()?;
            Some((
                Ipv6Addr::from(src).into(),
                Ipv6Addr::from(dst).into(),
                packet[6],
                IPV6_BASE_HEADER_LEN,
            ))
        }
        _ => None,
    }
}

fn looks_like_rtp(udp_payload: &[u8]) -> bool {
    udp_payload.len() >= RTP_MIN_HEADER_LEN && udp_payload[0] >> 6 == RTP_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_udp(udp_payload: &[u8], protocol: u8) -> Vec<u8> {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45;
        packet[9] = protocol;
        packet[12..16].copy_from_slice(&[192, 168, 0, 1]);
        packet[16..20].copy_from_slice(&[192, 168, 0, 2]);
        packet[20..22].copy_from_slice(&1234u16.to_be_bytes());
        packet[22..24].copy_from_slice(&5678u16.to_be_bytes());
        packet.extend_from_slice(udp_payload);
        packet
    }

    #[test]
    fn profile_ids_round_trip() {
        for profile in RohcProfile::KNOWN {
            assert_eq!(RohcProfile::from(u8::from(profile)), profile);
        }
        assert_eq!(RohcProfile::from(0x06), RohcProfile::Unknown(0x06));
        assert_eq!(u8::from(RohcProfile::Ip), 0x04);
    }

    #[test]
    fn profile_set_contains_enabled_profiles() {
        let set = ProfileSet::empty()
            .with(RohcProfile::Uncompressed)
            .with(RohcProfile::UdpIp);
        assert!(set.contains(RohcProfile::UdpIp));
        assert!(!set.contains(RohcProfile::RtpUdpIp));
        assert!(!set.contains(RohcProfile::Unknown(9)));
        assert_eq!(set.to_string(), "Uncompressed, UDP/IP");
        assert_eq!(ProfileSet::all().iter().count(), 5);
        assert!(ProfileSet::empty().is_empty());
    }

    #[test]
    fn rtp_payload_gets_rtp_chain() {
        let mut rtp = vec![0u8; 12];
        rtp[0] = 0x80;
        let info = PayloadInfo::inspect(&ipv4_udp(&rtp, IP_PROTOCOL_UDP));
        assert_eq!(info.candidates[0], RohcProfile::RtpUdpIp);
        assert!(matches!(
            info.flow,
            FlowKey::Ip {
                protocol: IP_PROTOCOL_UDP,
                ports: Some((1234, 5678)),
                ..
            }
        ));
    }

    #[test]
    fn short_udp_payload_is_not_rtp() {
        let info = PayloadInfo::inspect(&ipv4_udp(&[0x80, 0, 0], IP_PROTOCOL_UDP));
        assert_eq!(info.candidates[0], RohcProfile::UdpIp);
    }

    #[test]
    fn udp_lite_payload_gets_udp_lite_chain() {
        let info = PayloadInfo::inspect(&ipv4_udp(&[], IP_PROTOCOL_UDP_LITE));
        assert_eq!(info.candidates[0], RohcProfile::UdpLiteIp);
    }

    #[test]
    fn non_ip_payload_only_fits_uncompressed() {
        let info = PayloadInfo::inspect(&[0x12, 0x34, 0x56]);
        assert_eq!(info.flow, FlowKey::NonIp);
        assert_eq!(info.candidates, &[RohcProfile::Uncompressed]);
    }

    #[test]
    fn selection_falls_back_to_first_implemented_profile() {
        let info = PayloadInfo::inspect(&ipv4_udp(&[], IP_PROTOCOL_UDP));
        let implemented = ProfileSet::empty().with(RohcProfile::Uncompressed);
        assert_eq!(
            info.select(ProfileSet::all(), implemented),
            Some(RohcProfile::Uncompressed)
        );
        assert_eq!(
            info.select(ProfileSet::all(), ProfileSet::all()),
            Some(RohcProfile::UdpIp)
        );
        let only_rtp = ProfileSet::empty().with(RohcProfile::RtpUdpIp);
        assert_eq!(info.select(only_rtp, ProfileSet::all()), None);
    }

    #[test]
    fn ipv6_flow_key_uses_addresses() {
        let mut packet = vec![0u8; 40];
        packet[0] = 0x60;
        packet[6] = 59;
        packet[23] = 1;
        packet[39] = 2;
        let info = PayloadInfo::inspect(&packet);
        match info.flow {
            FlowKey::Ip {
                src, dst, protocol, ..
            } => {
                assert_eq!(src, "::1".parse::<IpAddr>().unwrap());
                assert_eq!(dst, "::2".parse::<IpAddr>().unwrap());
                assert_eq!(protocol, 59);
            }
            FlowKey::NonIp => panic!("IPv6 packet classified as non-IP"),
        }
        assert_eq!(info.candidates[0], RohcProfile::Ip);
    }
}
