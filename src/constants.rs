//! Constants shared by the harness, the link-layer helpers and the built-in codec.
//!
//! Link-layer sizes follow the capture formats the harness accepts. ROHC octet
//! patterns follow RFC 3095, Sections 5.2 and 5.10.

// --- Link layer ---

/// Ethernet header length in bytes (two MAC addresses plus the EtherType).
pub const ETHER_HDR_LEN: usize = 14;
/// Minimum Ethernet frame length (without FCS). Shorter frames are padded up to it.
pub const ETHER_FRAME_MIN_LEN: usize = 60;
/// Linux cooked-mode capture (SLL) header length in bytes.
pub const LINUX_COOKED_HDR_LEN: usize = 16;
/// Marker written over the type field of link-layer headers in the output flow,
/// so the stored ROHC units are never mistaken for a real protocol payload.
pub const ROHC_LINK_TYPE_MARKER: u16 = 0x162f;

/// PCAP link type for Ethernet.
pub const LINKTYPE_ETHERNET: i32 = 1;
/// PCAP link type for Linux cooked-mode capture.
pub const LINKTYPE_LINUX_SLL: i32 = 113;
/// PCAP link type for raw IP.
pub const LINKTYPE_RAW: i32 = 101;
/// Historical `DLT_RAW` values still found in older capture files.
pub const DLT_RAW_ALIASES: [i32; 2] = [12, 14];

// --- IP ---

/// Fixed IPv6 base header length in bytes.
pub const IPV6_BASE_HEADER_LEN: usize = 40;
/// Minimum IPv4 header length in bytes.
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// IP protocol number for UDP.
pub const IP_PROTOCOL_UDP: u8 = 17;
/// IP protocol number for UDP-Lite.
pub const IP_PROTOCOL_UDP_LITE: u8 = 136;
/// UDP header length in bytes.
pub const UDP_HEADER_LEN: usize = 8;
/// RTP version carried in the two most significant bits of the first RTP octet.
pub const RTP_VERSION: u8 = 2;
/// Minimum RTP header length in bytes.
pub const RTP_MIN_HEADER_LEN: usize = 12;

// --- Harness ---

/// Maximum size of a compressed or decompressed unit handled by one pipeline pass.
pub const MAX_ROHC_SIZE: usize = 5 * 1024;
/// Maximum number of bytes rendered by a packet comparison diff.
pub const COMPARE_DIFF_MAX_BYTES: usize = 180;
/// Number of byte cells per diff row.
pub const COMPARE_DIFF_ROW_CELLS: usize = 4;
/// Default maximum number of simultaneous compression contexts.
pub const DEFAULT_MAX_CONTEXTS: u32 = 15;
/// Upper bound accepted for the maximum number of contexts (large CIDs).
pub const MAX_CONTEXTS_LIMIT: u32 = 16384;
/// Number of contexts addressable with small CIDs (CID 0 to 15).
pub const SMALL_CID_CONTEXTS: u32 = 16;

/// Process exit code for a passing run.
pub const EXIT_PASS: u8 = 0;
/// Process exit code for a failing run, including startup errors.
pub const EXIT_FAIL: u8 = 1;
/// Process exit code for a skipped run (automake convention).
pub const EXIT_SKIP: u8 = 77;

// --- ROHC framing (RFC 3095, Sec 5.2) ---

/// Padding octet.
pub const ROHC_PADDING_OCTET: u8 = 0b1110_0000; // E0
/// Mask for the prefix of an Add-CID octet.
pub const ROHC_ADD_CID_PREFIX_MASK: u8 = 0b1111_0000; // F0
/// Prefix of an Add-CID octet (`1110cccc`).
pub const ROHC_ADD_CID_PREFIX: u8 = 0b1110_0000; // E0
/// Mask to extract the small CID (0-15) from an Add-CID octet.
pub const ROHC_SMALL_CID_MASK: u8 = 0x0F;
/// Largest small CID.
pub const ROHC_SMALL_CID_MAX: u16 = 15;
/// Largest large CID encodable with two SDVL octets.
pub const ROHC_LARGE_CID_MAX: u16 = 16383;
/// Prefix of a feedback element (`11110ccc`), compared against the five high bits.
pub const ROHC_FEEDBACK_PREFIX: u8 = 0b1111_0000; // F0
/// Mask for the code field of a feedback element.
pub const ROHC_FEEDBACK_CODE_MASK: u8 = 0b0000_0111;
/// Prefix of a segment octet (`1111111F`), compared against the seven high bits.
pub const ROHC_SEGMENT_PREFIX: u8 = 0b1111_1110; // FE
/// Base value of an IR packet type (`1111110D`).
pub const ROHC_IR_PACKET_TYPE: u8 = 0b1111_1100; // FC
/// D-bit of an IR packet type.
pub const ROHC_IR_D_BIT_MASK: u8 = 0b0000_0001;
/// IR-DYN packet type.
pub const ROHC_IR_DYN_PACKET_TYPE: u8 = 0b1111_1000; // F8

// --- Profiles (RFC 3095, RFC 3843, RFC 4019) ---

/// Profile identifier for Uncompressed.
pub const PROFILE_ID_UNCOMPRESSED: u8 = 0x00;
/// Profile identifier for RTP/UDP/IP.
pub const PROFILE_ID_RTP_UDP_IP: u8 = 0x01;
/// Profile identifier for UDP/IP.
pub const PROFILE_ID_UDP_IP: u8 = 0x02;
/// Profile identifier for IP-only.
pub const PROFILE_ID_IP_ONLY: u8 = 0x04;
/// Profile identifier for UDP-Lite/IP.
pub const PROFILE_ID_UDP_LITE_IP: u8 = 0x08;

// --- Built-in codec ---

/// Default interval (packets) for IR refresh in unidirectional mode.
pub const DEFAULT_IR_REFRESH_INTERVAL: u32 = 20;
/// Default number of IR packets sent before trusting the decompressor in U-mode.
pub const DEFAULT_IR_REPETITIONS: u32 = 3;
