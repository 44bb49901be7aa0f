//! # Label-Language Command Builders (TSPL)
//!
//! The label printer speaks a line-oriented ASCII protocol: every command
//! is one line terminated by CR LF. Numeric fields render as plain base-10
//! integers; string fields are embedded verbatim between double quotes.
//! Embedded quotes are the caller's responsibility; the protocol has no
//! escaping.
//!
//! ## Command Summary
//!
//! | Command | Line |
//! |---------|------|
//! | Label size | `SIZE <w> mm,<h> mm` |
//! | Gap | `GAP <g> mm,0 mm` |
//! | Direction | `DIRECTION <0\|1>` |
//! | Clear buffer | `CLS` |
//! | Box | `BOX <x1>,<y1>,<x2>,<y2>,<lineWidth>` |
//! | Text | `TEXT <x>,<y>,"<font>",<rot>,<xMul>,<yMul>,"<content>"` |
//! | Filled bar | `BAR <x>,<y>,<w>,<h>` |
//! | QR code | `QRCODE <x>,<y>,<ecc>,<cell>,A,<rot>,"<content>"` |
//! | 1D barcode | `BARCODE <x>,<y>,"<type>",<h>,<readable>,<rot>,<narrow>,<wide>,"<content>"` |
//! | Bitmap | `BITMAP <x>,<y>,<byteWidth>,<rowCount>,0,<bits>` |
//! | Print | `PRINT <copies>,<sets>` |
//!
//! Plus paper handling (`FEED`, `BACKFEED`, `CUT`) and setup commands
//! (`SPEED`, `DENSITY`, `REFERENCE`, `TEAR`).
//!
//! ## Example
//!
//! ```
//! use etiqueta::protocol::tspl;
//!
//! let mut job = Vec::new();
//! job.extend(tspl::size(54, 38));
//! job.extend(tspl::gap(2));
//! job.extend(tspl::cls());
//! job.extend(tspl::text(2, 10, "3", 0, 1, 1, "hello"));
//! job.extend(tspl::print(1, 1));
//! ```

use crate::raster::RasterChunk;

/// CR LF line terminator shared by every label-language command.
const CRLF: &[u8] = b"\r\n";

/// QR error-correction level field of the `QRCODE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrEccLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl QrEccLevel {
    pub fn as_char(self) -> char {
        match self {
            QrEccLevel::L => 'L',
            QrEccLevel::M => 'M',
            QrEccLevel::Q => 'Q',
            QrEccLevel::H => 'H',
        }
    }
}

fn line(s: String) -> Vec<u8> {
    let mut out = s.into_bytes();
    out.extend_from_slice(CRLF);
    out
}

/// `SIZE <w> mm,<h> mm` - label dimensions in millimeters.
pub fn size(width_mm: u32, height_mm: u32) -> Vec<u8> {
    line(format!("SIZE {width_mm} mm,{height_mm} mm"))
}

/// `GAP <g> mm,0 mm` - gap between labels in millimeters.
pub fn gap(gap_mm: u32) -> Vec<u8> {
    line(format!("GAP {gap_mm} mm,0 mm"))
}

/// `DIRECTION <d>` - 0 prints from the near edge, 1 reversed.
pub fn direction(direction: u8) -> Vec<u8> {
    line(format!("DIRECTION {direction}"))
}

/// `CLS` - clear the image buffer. Sent at the start of every job.
pub fn cls() -> Vec<u8> {
    line("CLS".to_string())
}

/// `BOX <x1>,<y1>,<x2>,<y2>,<lineWidth>` - rectangle outline.
pub fn draw_box(x1: u32, y1: u32, x2: u32, y2: u32, line_width: u32) -> Vec<u8> {
    line(format!("BOX {x1},{y1},{x2},{y2},{line_width}"))
}

/// `TEXT <x>,<y>,"<font>",<rot>,<xMul>,<yMul>,"<content>"`
///
/// `font` is the printer-resident font name ("1".."8" for the bitmap
/// fonts, or e.g. "TSS24.BF2"). `rotation` is 0, 90, 180 or 270.
/// Multipliers scale the glyph cell 1–10x per axis.
pub fn text(
    x: u32,
    y: u32,
    font: &str,
    rotation: u16,
    x_mul: u8,
    y_mul: u8,
    content: &str,
) -> Vec<u8> {
    line(format!(
        "TEXT {x},{y},\"{font}\",{rotation},{x_mul},{y_mul},\"{content}\""
    ))
}

/// `BAR <x>,<y>,<w>,<h>` - filled rectangle, used for divider lines.
pub fn bar(x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    line(format!("BAR {x},{y},{width},{height}"))
}

/// `QRCODE <x>,<y>,<ecc>,<cell>,A,<rot>,"<content>"`
///
/// Mode is always `A` (automatic data encoding). `cell_width` is the
/// module size in dots (1–10).
pub fn qrcode(
    x: u32,
    y: u32,
    ecc: QrEccLevel,
    cell_width: u8,
    rotation: u16,
    content: &str,
) -> Vec<u8> {
    line(format!(
        "QRCODE {x},{y},{},{cell_width},A,{rotation},\"{content}\"",
        ecc.as_char()
    ))
}

/// `BARCODE <x>,<y>,"<type>",<h>,<readable>,<rot>,<narrow>,<wide>,"<content>"`
///
/// `kind` is the symbology name the firmware knows ("128", "39", "EAN13",
/// ...). `human_readable` prints the content under the bars when true.
/// `narrow`/`wide` are the module widths in dots.
#[allow(clippy::too_many_arguments)]
pub fn barcode(
    x: u32,
    y: u32,
    kind: &str,
    height: u32,
    human_readable: bool,
    rotation: u16,
    narrow: u8,
    wide: u8,
    content: &str,
) -> Vec<u8> {
    line(format!(
        "BARCODE {x},{y},\"{kind}\",{height},{},{rotation},{narrow},{wide},\"{content}\"",
        u8::from(human_readable)
    ))
}

/// `BITMAP <x>,<y>,<byteWidth>,<rowCount>,0,<bits>` - one raster chunk.
///
/// Mode 0 is OVERWRITE. The packed bits follow the comma directly and the
/// CR LF terminator comes after them; the firmware knows the payload
/// length from the header fields.
pub fn bitmap(chunk: &RasterChunk) -> Vec<u8> {
    let mut out = format!(
        "BITMAP {},{},{},{},0,",
        chunk.origin_x, chunk.origin_y, chunk.byte_width, chunk.row_count
    )
    .into_bytes();
    out.extend_from_slice(&chunk.packed_bits);
    out.extend_from_slice(CRLF);
    out
}

/// `PRINT <copies>,<sets>` - render the buffer onto paper.
pub fn print(copies: u32, sets: u32) -> Vec<u8> {
    line(format!("PRINT {copies},{sets}"))
}

/// `FEED` - advance one label.
pub fn feed() -> Vec<u8> {
    line("FEED".to_string())
}

/// `BACKFEED` - pull the label back to the print line.
pub fn backfeed() -> Vec<u8> {
    line("BACKFEED".to_string())
}

/// `CUT` - activate the cutter.
pub fn cut() -> Vec<u8> {
    line("CUT".to_string())
}

/// `SPEED <n>` - print speed, 1–6.
pub fn speed(speed: u8) -> Vec<u8> {
    line(format!("SPEED {speed}"))
}

/// `DENSITY <n>` - darkness, 0–15.
pub fn density(density: u8) -> Vec<u8> {
    line(format!("DENSITY {density}"))
}

/// `REFERENCE <x>,<y>` - origin of the coordinate system.
pub fn reference(x: u32, y: u32) -> Vec<u8> {
    line(format!("REFERENCE {x},{y}"))
}

/// `TEAR <n>` - tear-off position adjustment.
pub fn tear(position: u32) -> Vec<u8> {
    line(format!("TEAR {position}"))
}
