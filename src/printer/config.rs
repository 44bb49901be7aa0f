//! # Label Geometry Configuration
//!
//! Physical properties of the loaded label stock. The label printer has no
//! notion of page size on its own; every job states the geometry up front
//! (`SIZE`, `GAP`, `DIRECTION` lines), so the service prepends these to
//! each label job.
//!
//! ## Defaults
//!
//! | Property | Value |
//! |----------|-------|
//! | Label width | 54 mm |
//! | Label height | 38 mm |
//! | Gap between labels | 2 mm |
//! | Direction | 1 (reversed) |

use crate::protocol::tspl;

/// Loaded label stock geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelConfig {
    /// Label width in millimeters
    pub width_mm: u32,
    /// Label height in millimeters
    pub height_mm: u32,
    /// Gap between consecutive labels in millimeters
    pub gap_mm: u32,
    /// Print direction, 0 or 1
    pub direction: u8,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            width_mm: 54,
            height_mm: 38,
            gap_mm: 2,
            direction: 1,
        }
    }
}

impl LabelConfig {
    /// The `SIZE`/`GAP`/`DIRECTION` lines opening every label job.
    pub fn preamble(&self) -> Vec<u8> {
        let mut out = tspl::size(self.width_mm, self.height_mm);
        out.extend(tspl::gap(self.gap_mm));
        out.extend(tspl::direction(self.direction));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preamble() {
        let preamble = LabelConfig::default().preamble();
        assert_eq!(
            preamble,
            b"SIZE 54 mm,38 mm\r\nGAP 2 mm,0 mm\r\nDIRECTION 1\r\n"
        );
    }
}
