//! ROHC CRC calculation.
//!
//! Wraps the `crc` crate's ROHC CRC-8 (RFC 3095, Section 5.9.1), which covers
//! IR headers. The calculator is built once by the harness entry point and
//! shared read-only by every compressor and decompressor through an `Arc`.

use std::fmt;

use crc::{CRC_8_ROHC, Crc};

/// Pre-initialized CRC algorithm instances for ROHC.
pub struct CrcCalculators {
    crc8_calculator: Crc<u8>,
}

impl fmt::Debug for CrcCalculators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrcCalculators")
            .field("crc8_calculator", &format_args!("Crc<u8>(ROHC_CRC8_Algo)"))
            .finish()
    }
}

impl CrcCalculators {
    /// Creates the ROHC CRC-8 calculator.
    pub fn new() -> Self {
        Self {
            crc8_calculator: Crc::<u8>::new(&CRC_8_ROHC),
        }
    }

    /// Calculates the ROHC 8-bit CRC.
    #[inline]
    pub fn crc8(&self, input: &[u8]) -> u8 {
        self.crc8_calculator.checksum(input)
    }
}

impl Default for CrcCalculators {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_calculators_debug_format() {
        let debug_str = format!("{:?}", CrcCalculators::new());
        assert!(debug_str.contains("CrcCalculators"));
        assert!(debug_str.contains("crc8_calculator: Crc<u8>(ROHC_CRC8_Algo)"));
    }

    #[test]
    fn crc8_standard_test_vector() {
        let calculators = CrcCalculators::new();
        assert_eq!(calculators.crc8(b"123456789"), 0xD0);
        assert_eq!(CRC_8_ROHC.check, 0xD0);
    }

    #[test]
    fn crc8_empty_input_is_initial_value() {
        assert_eq!(CrcCalculators::new().crc8(b""), 0xFF);
    }
}
