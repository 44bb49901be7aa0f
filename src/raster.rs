//! # Bitmap Rasterization and Packetization
//!
//! Converts an RGBA image into the monochrome bit-packed raster format the
//! label printer expects, split into chunks small enough for its receive
//! buffer.
//!
//! ## Binarization
//!
//! Thermal label heads print black or nothing, so every pixel collapses to
//! one bit. The rule is fixed:
//!
//! - alpha == 0 → white (paper)
//! - otherwise, luma = 0.3R + 0.59G + 0.11B; luma ≤ 127 → black
//!
//! Black pixels set their bit. Bits are packed MSB-first, one bit per
//! column, columns left to right:
//!
//! ```text
//! columns:   0  1  2  3  4  5  6  7
//! bit:      128 64 32 16  8  4  2  1
//! ```
//!
//! ## Chunking
//!
//! Printer receive buffers are small; a full-height bitmap can overflow
//! them mid-transfer. Rows are therefore partitioned into consecutive
//! chunks of at most `MAX_CHUNK_BYTES` bytes each:
//!
//! ```text
//! byte_width     = ceil(width / 8)
//! rows_per_chunk = max(1, MAX_CHUNK_BYTES / byte_width)
//! ```
//!
//! Each chunk carries its own `origin_y` so the downstream `BITMAP`
//! command addresses the correct vertical position. Together the chunks
//! cover every image row exactly once, in increasing `origin_y` order.

use image::RgbaImage;

use crate::error::EtiquetaError;

/// Ceiling on the packed payload of one chunk, in bytes.
///
/// Bounds worst-case buffer usage on the receiving device regardless of
/// image width.
pub const MAX_CHUNK_BYTES: u32 = 2048;

/// One bounded slice of a monochrome bit-packed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterChunk {
    /// Horizontal print position, passed through from the draw call
    pub origin_x: u32,
    /// Vertical offset of this chunk's first row within the full image,
    /// plus the draw call's y position
    pub origin_y: u32,
    /// Bytes per row (`ceil(width / 8)`)
    pub byte_width: u32,
    /// Rows in this chunk
    pub row_count: u32,
    /// Packed bits; always `byte_width * row_count` bytes
    pub packed_bits: Vec<u8>,
}

/// Classify one RGBA pixel as black (printed) or white.
///
/// Pure function of (A, R, G, B); see the module docs for the rule.
#[inline]
pub fn is_black(r: u8, g: u8, b: u8, a: u8) -> bool {
    if a == 0 {
        return false;
    }
    let luma = 0.3 * f32::from(r) + 0.59 * f32::from(g) + 0.11 * f32::from(b);
    luma <= 127.0
}

/// Rasterize an image into bounded chunks positioned at (`x`, `y`).
///
/// Returns [`EtiquetaError::MalformedInput`] for a zero-width or
/// zero-height image; a degenerate image is a caller bug, not a no-op.
pub fn rasterize(image: &RgbaImage, x: u32, y: u32) -> Result<Vec<RasterChunk>, EtiquetaError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EtiquetaError::MalformedInput(format!(
            "image has zero dimension ({width}x{height})"
        )));
    }

    let byte_width = width.div_ceil(8);
    // A row wider than the ceiling still moves, one row per chunk.
    let rows_per_chunk = (MAX_CHUNK_BYTES / byte_width).max(1);

    let mut chunks = Vec::with_capacity(height.div_ceil(rows_per_chunk) as usize);
    let mut start_row = 0u32;
    while start_row < height {
        let row_count = rows_per_chunk.min(height - start_row);
        let mut packed = vec![0u8; (byte_width * row_count) as usize];

        for row in 0..row_count {
            for col in 0..width {
                let px = image.get_pixel(col, start_row + row);
                let [r, g, b, a] = px.0;
                if is_black(r, g, b, a) {
                    let idx = (row * byte_width + col / 8) as usize;
                    packed[idx] |= 0x80 >> (col % 8);
                }
            }
        }

        chunks.push(RasterChunk {
            origin_x: x,
            origin_y: y + start_row,
            byte_width,
            row_count,
            packed_bits: packed,
        });
        start_row += row_count;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(px))
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let img = RgbaImage::new(0, 10);
        assert!(matches!(
            rasterize(&img, 0, 0),
            Err(EtiquetaError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_black_image_all_bits_set() {
        let img = solid(8, 2, [0, 0, 0, 255]);
        let chunks = rasterize(&img, 0, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].byte_width, 1);
        assert_eq!(chunks[0].row_count, 2);
        assert_eq!(chunks[0].packed_bits, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_transparent_is_white() {
        // Transparent black would binarize to black by luma alone
        let img = solid(8, 1, [0, 0, 0, 0]);
        let chunks = rasterize(&img, 0, 0).unwrap();
        assert_eq!(chunks[0].packed_bits, vec![0x00]);
    }

    #[test]
    fn test_luma_threshold() {
        // 0.3*128 + 0.59*128 + 0.11*128 = 128.0 > 127 → white
        assert!(!is_black(128, 128, 128, 255));
        // 127 exactly → black
        assert!(is_black(127, 127, 127, 255));
        assert!(is_black(0, 0, 0, 255));
        assert!(!is_black(255, 255, 255, 255));
    }

    #[test]
    fn test_msb_first_packing() {
        // Black pixel in column 0 only, width 10 → two bytes per row
        let mut img = solid(10, 1, [255, 255, 255, 255]);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(9, 0, Rgba([0, 0, 0, 255]));
        let chunks = rasterize(&img, 0, 0).unwrap();
        assert_eq!(chunks[0].byte_width, 2);
        assert_eq!(chunks[0].packed_bits, vec![0x80, 0x40]);
    }

    #[test]
    fn test_chunks_cover_rows_exactly_once() {
        // byte_width = 75 → rows_per_chunk = 2048 / 75 = 27
        let img = solid(600, 100, [0, 0, 0, 255]);
        let chunks = rasterize(&img, 10, 20).unwrap();

        let rows_per_chunk = MAX_CHUNK_BYTES / 75;
        assert_eq!(rows_per_chunk, 27);

        let mut expected_y = 20;
        let mut total_rows = 0;
        for chunk in &chunks {
            assert_eq!(chunk.origin_x, 10);
            assert_eq!(chunk.origin_y, expected_y);
            assert!(chunk.row_count <= rows_per_chunk);
            assert_eq!(
                chunk.packed_bits.len(),
                (chunk.byte_width * chunk.row_count) as usize
            );
            expected_y += chunk.row_count;
            total_rows += chunk.row_count;
        }
        assert_eq!(total_rows, 100);
        // 100 = 27 + 27 + 27 + 19
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.last().unwrap().row_count, 19);
    }

    #[test]
    fn test_ultrawide_image_one_row_per_chunk() {
        // byte_width = 2176 > MAX_CHUNK_BYTES → clamp to one row per chunk
        let img = solid(17408, 3, [0, 0, 0, 255]);
        let chunks = rasterize(&img, 0, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.row_count == 1));
    }

    #[test]
    fn test_evenly_divisible_height() {
        // byte_width = 1 → rows_per_chunk = 2048; height 4096 → two full chunks
        let img = solid(8, 4096, [0, 0, 0, 255]);
        let chunks = rasterize(&img, 0, 0).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].row_count, 2048);
        assert_eq!(chunks[1].row_count, 2048);
        assert_eq!(chunks[1].origin_y, 2048);
    }
}
