//! # Printer Protocol Implementation
//!
//! Command builders for the two printer languages this library targets,
//! plus a language-independent [`Command`] value type and its encoder.
//!
//! ## Module Structure
//!
//! - [`tspl`]: line-oriented label-printer language (ASCII, CRLF lines)
//! - [`escpos`]: binary receipt-printer control language
//!
//! ## Encoding Model
//!
//! Encoding is a pure mapping: the same [`Command`] with the same
//! [`Language`] always produces byte-identical output. No I/O and no
//! retry logic lives here; a write failure belongs to the transport.
//!
//! ```
//! use etiqueta::protocol::{encode, Command, ControlCommand, Language};
//!
//! let bytes = encode(&Command::Control(ControlCommand::Feed(5)), Language::Receipt)?;
//! assert_eq!(bytes, vec![0x1B, 0x64, 0x05]);
//! # Ok::<(), etiqueta::EtiquetaError>(())
//! ```

pub mod escpos;
pub mod tspl;

use image::RgbaImage;

use crate::error::EtiquetaError;
use crate::raster;

pub use tspl::QrEccLevel;

/// Which command language the connected printer speaks.
///
/// Selected once per service instance, never per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// Line-oriented label language (TSPL)
    Label,
    /// Binary receipt control language (ESC/POS)
    Receipt,
}

/// Paper and buffer control operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Clear the image buffer (label) / reset the printer (receipt)
    Cls,
    /// Advance paper. The line count applies to the receipt language;
    /// the label language feeds whole labels.
    Feed(u32),
    /// Activate the cutter
    Cut,
    /// Print the composed label buffer
    Print { copies: u32, sets: u32 },
}

/// One printer operation as a value.
///
/// Constructed per call, consumed exactly once by [`encode`].
#[derive(Debug, Clone)]
pub enum Command {
    Text {
        x: u32,
        y: u32,
        font: String,
        rotation: u16,
        x_mul: u8,
        y_mul: u8,
        content: String,
    },
    Barcode {
        x: u32,
        y: u32,
        kind: String,
        height: u32,
        human_readable: bool,
        rotation: u16,
        narrow: u8,
        wide: u8,
        content: String,
    },
    QrCode {
        x: u32,
        y: u32,
        ecc: QrEccLevel,
        cell_width: u8,
        rotation: u16,
        content: String,
    },
    Box {
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        line_width: u32,
    },
    Image {
        x: u32,
        y: u32,
        bitmap: RgbaImage,
    },
    Raw(Vec<u8>),
    Control(ControlCommand),
}

/// Render one command into the exact bytes for the selected language.
///
/// Image commands rasterize through [`crate::raster`] and emit one
/// `BITMAP` line per chunk, all chunks in order, so the full image is on
/// the wire before any subsequent command.
///
/// ## Errors
///
/// - [`EtiquetaError::Unsupported`] for operations the receipt language
///   has no encoding for (graphics, barcodes, label buffer control)
/// - [`EtiquetaError::MalformedInput`] for zero-dimension images
pub fn encode(command: &Command, language: Language) -> Result<Vec<u8>, EtiquetaError> {
    match language {
        Language::Label => encode_label(command),
        Language::Receipt => encode_receipt(command),
    }
}

fn encode_label(command: &Command) -> Result<Vec<u8>, EtiquetaError> {
    let bytes = match command {
        Command::Text {
            x,
            y,
            font,
            rotation,
            x_mul,
            y_mul,
            content,
        } => tspl::text(*x, *y, font, *rotation, *x_mul, *y_mul, content),
        Command::Barcode {
            x,
            y,
            kind,
            height,
            human_readable,
            rotation,
            narrow,
            wide,
            content,
        } => tspl::barcode(
            *x,
            *y,
            kind,
            *height,
            *human_readable,
            *rotation,
            *narrow,
            *wide,
            content,
        ),
        Command::QrCode {
            x,
            y,
            ecc,
            cell_width,
            rotation,
            content,
        } => tspl::qrcode(*x, *y, *ecc, *cell_width, *rotation, content),
        Command::Box {
            x1,
            y1,
            x2,
            y2,
            line_width,
        } => tspl::draw_box(*x1, *y1, *x2, *y2, *line_width),
        Command::Image { x, y, bitmap } => {
            let chunks = raster::rasterize(bitmap, *x, *y)?;
            let mut out = Vec::new();
            for chunk in &chunks {
                out.extend(tspl::bitmap(chunk));
            }
            out
        }
        Command::Raw(bytes) => bytes.clone(),
        Command::Control(control) => match control {
            ControlCommand::Cls => tspl::cls(),
            ControlCommand::Feed(_) => tspl::feed(),
            ControlCommand::Cut => tspl::cut(),
            ControlCommand::Print { copies, sets } => tspl::print(*copies, *sets),
        },
    };
    Ok(bytes)
}

fn encode_receipt(command: &Command) -> Result<Vec<u8>, EtiquetaError> {
    let bytes = match command {
        Command::Text { content, .. } => escpos::text(content),
        Command::Raw(bytes) => bytes.clone(),
        Command::Control(control) => match control {
            ControlCommand::Cls => escpos::init(),
            ControlCommand::Feed(lines) => escpos::feed(*lines),
            ControlCommand::Cut => escpos::cut(),
            ControlCommand::Print { .. } => {
                return Err(EtiquetaError::Unsupported(
                    "PRINT is a label-language command",
                ));
            }
        },
        Command::Barcode { .. } => {
            return Err(EtiquetaError::Unsupported(
                "barcodes are label-language only",
            ));
        }
        Command::QrCode { .. } => {
            return Err(EtiquetaError::Unsupported(
                "QR codes are label-language only",
            ));
        }
        Command::Box { .. } => {
            return Err(EtiquetaError::Unsupported("boxes are label-language only"));
        }
        Command::Image { .. } => {
            return Err(EtiquetaError::Unsupported(
                "raster graphics are label-language only",
            ));
        }
    };
    Ok(bytes)
}
