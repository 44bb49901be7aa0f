//! # Etiqueta - USB Label Printer Library
//!
//! Etiqueta is a Rust library for driving label and receipt printers
//! attached over USB or a UART-style serial link, and for ingesting byte
//! streams from an attached serial scale. It provides:
//!
//! - **Connection management**: device discovery, permission flow and a
//!   periodic reconnect loop reduced to one connected/disconnected signal
//! - **Protocol implementation**: command builders for the line-oriented
//!   label language (TSPL) and the binary receipt language (ESC/POS)
//! - **Rasterization**: monochrome bit-packing with transfer-size-bounded
//!   chunking for printer receive buffers
//! - **Stream framing**: quiet-period framing of serial bursts into
//!   discrete hex readings
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::{Arc, mpsc};
//! use etiqueta::printer::PrinterService;
//! use etiqueta::protocol::Language;
//! use etiqueta::transport::{DeviceIdentity, MockTransport};
//!
//! // A real deployment injects its platform transport here.
//! let transport = Arc::new(MockTransport::new());
//! let (event_tx, event_rx) = mpsc::channel();
//!
//! let service = PrinterService::new(transport, Language::Label)?;
//! service.set_connectivity_listener(|connected| println!("printer: {connected}"));
//! service.set_reading_listener(|hex| println!("scale reading: {hex}"));
//!
//! service.connect(DeviceIdentity::new(19267, 13624), event_rx)?;
//! service.print_text("hello")?;
//! # drop(event_tx);
//! # Ok::<(), etiqueta::EtiquetaError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`printer`] | The service API surface |
//! | [`connection`] | Attach/detach/permission state machine |
//! | [`protocol`] | TSPL and ESC/POS command builders |
//! | [`raster`] | Bitmap binarization and chunking |
//! | [`stream`] | Serial burst framing |
//! | [`transport`] | Injected USB/serial boundary |
//! | [`event`] | Ordered listener dispatch |
//! | [`error`] | Error types |
//!
//! The library never touches hardware itself: an implementation of
//! [`transport::Transport`] is injected, and hardware notifications are
//! fed in as [`transport::TransportEvent`] values. Everything else
//! (reconnect policy, command encoding, raster chunking, reading framing)
//! lives here and is deterministic and testable.

pub mod cancel;
pub mod connection;
pub mod error;
pub mod event;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use connection::ConnectionState;
pub use error::EtiquetaError;
pub use printer::PrinterService;
pub use protocol::Language;
pub use transport::DeviceIdentity;
