//! Byte-exact packet comparison with a bounded human-readable diff.
//!
//! Equality always considers both full buffers. The diff window is capped at
//! [`COMPARE_DIFF_MAX_BYTES`] only to keep reports readable.

use std::fmt;

use crate::constants::{COMPARE_DIFF_MAX_BYTES, COMPARE_DIFF_ROW_CELLS};

/// Result of comparing two packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketComparison {
    diff: Option<PacketDiff>,
}

impl PacketComparison {
    /// `true` when both buffers have the same length and the same bytes.
    pub fn is_equal(&self) -> bool {
        self.diff.is_none()
    }

    /// Diagnostic rendering, present only when the packets differ.
    pub fn diff(&self) -> Option<&PacketDiff> {
        self.diff.as_ref()
    }
}

/// Compares two packets byte for byte.
pub fn compare_packets(first: &[u8], second: &[u8]) -> PacketComparison {
    if first == second {
        return PacketComparison { diff: None };
    }

    let compared = first.len().min(second.len()).min(COMPARE_DIFF_MAX_BYTES);
    PacketComparison {
        diff: Some(PacketDiff {
            first_len: first.len(),
            second_len: second.len(),
            cells: first[..compared]
                .iter()
                .copied()
                .zip(second[..compared].iter().copied())
                .collect(),
        }),
    }
}

/// Side-by-side rendering of the compared window of two differing packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDiff {
    first_len: usize,
    second_len: usize,
    cells: Vec<(u8, u8)>,
}

impl PacketDiff {
    /// Number of bytes rendered.
    pub fn compared_len(&self) -> usize {
        self.cells.len()
    }

    /// Offsets inside the compared window whose bytes differ.
    pub fn differing_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(offset, _)| offset)
    }

    /// Whether the two packets have different lengths.
    pub fn sizes_differ(&self) -> bool {
        self.first_len != self.second_len
    }
}

struct Cell {
    value: u8,
    differs: bool,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = if self.differs { ('#', '#') } else { ('[', ']') };
        write!(f, "{open}0x{:02x}{close}", self.value)
    }
}

impl fmt::Display for PacketDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "------------------------------ Compare ------------------------------"
        )?;
        if self.sizes_differ() {
            writeln!(
                f,
                "packets have different sizes ({} != {}), compare only the {} first bytes",
                self.first_len,
                self.second_len,
                self.compared_len()
            )?;
        }

        for row in self.cells.chunks(COMPARE_DIFF_ROW_CELLS) {
            for slot in 0..COMPARE_DIFF_ROW_CELLS {
                match row.get(slot) {
                    Some(&(a, b)) => write!(
                        f,
                        "{}  ",
                        Cell {
                            value: a,
                            differs: a != b
                        }
                    )?,
                    None => f.write_str("        ")?,
                }
            }
            f.write_str("      ")?;
            for &(a, b) in row {
                write!(
                    f,
                    "{}  ",
                    Cell {
                        value: b,
                        differs: a != b
                    }
                )?;
            }
            writeln!(f)?;
        }

        writeln!(
            f,
            "----------------------- packets are different -----------------------"
        )
    }
}
