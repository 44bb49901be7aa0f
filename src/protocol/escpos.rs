//! # Receipt-Language Command Builders (ESC/POS)
//!
//! The receipt printer speaks a binary control-code protocol. Commands are
//! short fixed byte sequences; free text is raw bytes in the printer's
//! character set.
//!
//! ## Command Summary
//!
//! | Command | Bytes |
//! |---------|-------|
//! | Initialize | `10 FF FE 01 1B 40` |
//! | Full cut | `1D 56 00` |
//! | Feed n lines | `1B 64 n` |
//! | Density | `1D 7A n` |
//!
//! The initialize sequence is the hardware's documented wake-up preamble
//! (`DLE FF FE 01`) followed by the standard `ESC @` reset. It must be
//! sent before free text.
//!
//! ## Text Encoding
//!
//! Free text is encoded as **GBK**, fixed and non-configurable: the target
//! hardware's resident character set is a legacy double-byte code page and
//! renders nothing else correctly. Characters with no GBK representation
//! are substituted by `encoding_rs` (numeric character references), which
//! at worst prints readable ASCII instead of garbage. This encoding is
//! specific to the receipt path; the label language is plain ASCII lines.

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// DLE (Data Link Escape) - Wake-up prefix on this hardware
pub const DLE: u8 = 0x10;

/// LF (Line Feed) - Print buffer and advance one line
pub const LF: u8 = 0x0A;

/// Initialize the printer.
///
/// Wake-up preamble plus `ESC @` reset. Sent at the start of every
/// receipt job, before any text.
#[inline]
pub fn init() -> Vec<u8> {
    vec![DLE, 0xFF, 0xFE, 0x01, ESC, b'@']
}

/// Full cut at the current position (`GS V 0`).
#[inline]
pub fn cut() -> Vec<u8> {
    vec![GS, b'V', 0x00]
}

/// Feed `lines` lines (`ESC d n`).
///
/// The wire field is a single byte; larger values are clipped to 255.
#[inline]
pub fn feed(lines: u32) -> Vec<u8> {
    vec![ESC, b'd', lines.min(255) as u8]
}

/// Set print density (`GS z n`), 0–255.
#[inline]
pub fn density(level: u8) -> Vec<u8> {
    vec![GS, b'z', level]
}

/// Encode free text as GBK bytes.
pub fn text(content: &str) -> Vec<u8> {
    let (bytes, _, _) = encoding_rs::GBK.encode(content);
    bytes.into_owned()
}
