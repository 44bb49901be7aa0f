//! # Printer Service
//!
//! The external API surface of the library. Orchestrates the connection
//! manager, the protocol encoder and the injected transport to execute
//! print operations.
//!
//! ## Call Model
//!
//! Every print method validates synchronously (connected? payload well
//! formed?) and returns; the actual transfer runs on a worker thread so
//! the caller never blocks on device I/O. Concurrent print calls are
//! safe: each job is encoded into one contiguous byte buffer and written
//! while holding the shared handle mutex, so bytes from two jobs never
//! interleave on the wire.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::{Arc, mpsc};
//! use etiqueta::printer::PrinterService;
//! use etiqueta::protocol::Language;
//! use etiqueta::transport::{DeviceIdentity, MockTransport};
//!
//! let transport = MockTransport::new();
//! let service = PrinterService::new(Arc::new(transport), Language::Label)?;
//! service.set_connectivity_listener(|connected| println!("printer: {connected}"));
//! service.set_reading_listener(|hex| println!("scale: {hex}"));
//!
//! let (_event_tx, event_rx) = mpsc::channel();
//! service.connect(DeviceIdentity::new(19267, 13624), event_rx)?;
//!
//! // Queued for transfer; errors here are validation errors only.
//! service.print_text("hello")?;
//! # Ok::<(), etiqueta::EtiquetaError>(())
//! ```

pub mod config;

pub use config::LabelConfig;

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use tracing::{error, info, warn};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::EtiquetaError;
use crate::event::EventDispatcher;
use crate::protocol::{self, Command, ControlCommand, Language, QrEccLevel, escpos, tspl};
use crate::transport::{DeviceIdentity, Transport, TransportEvent};

// Default placement for the single-operation convenience methods. Callers
// that need full layout control go through `print_commands`.
const TEXT_X: u32 = 2;
const TEXT_Y: u32 = 10;
const TEXT_FONT: &str = "TSS24.BF2";
const BARCODE_X: u32 = 0;
const BARCODE_Y: u32 = 50;
const QR_X: u32 = 0;
const QR_Y: u32 = 0;

/// One printer (and its scale stream) behind a small synchronous API.
///
/// Owns the event dispatcher thread; [`PrinterService::connect`] adds the
/// reconnect timer, the transport event pump and the serial read loop.
/// Dropping the service tears all of them down.
pub struct PrinterService {
    transport: Arc<dyn Transport>,
    language: Language,
    label: LabelConfig,
    manager: Mutex<Option<ConnectionManager>>,
    dispatcher: EventDispatcher,
}

impl PrinterService {
    pub fn new(transport: Arc<dyn Transport>, language: Language) -> Result<Self, EtiquetaError> {
        Self::with_label_config(transport, language, LabelConfig::default())
    }

    pub fn with_label_config(
        transport: Arc<dyn Transport>,
        language: Language,
        label: LabelConfig,
    ) -> Result<Self, EtiquetaError> {
        Ok(Self {
            transport,
            language,
            label,
            manager: Mutex::new(None),
            dispatcher: EventDispatcher::start()?,
        })
    }

    /// Begin managing a device. `transport_events` is the channel on
    /// which the transport implementation delivers attach/detach and
    /// permission notifications; a fresh receiver is needed per connect.
    ///
    /// Replaces (and fully tears down) any previous connection.
    pub fn connect(
        &self,
        identity: DeviceIdentity,
        transport_events: Receiver<TransportEvent>,
    ) -> Result<(), EtiquetaError> {
        let mut guard = self.manager.lock().unwrap();
        if let Some(mut previous) = guard.take() {
            previous.shutdown();
        }
        info!(device = %identity, "starting connection management");
        let mut manager = ConnectionManager::new(
            Arc::clone(&self.transport),
            identity,
            self.dispatcher.sender(),
        );
        manager.start(transport_events)?;
        *guard = Some(manager);
        Ok(())
    }

    /// Stop the reconnect loop and the read loop, join their threads and
    /// release the device handle.
    pub fn disconnect(&self) {
        if let Some(mut manager) = self.manager.lock().unwrap().take() {
            manager.shutdown();
            info!("connection management stopped");
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager
            .lock()
            .unwrap()
            .as_ref()
            .map_or(ConnectionState::Disconnected, |m| m.state())
    }

    pub fn is_connected(&self) -> bool {
        self.manager
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|m| m.is_connected())
    }

    pub fn set_connectivity_listener(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.dispatcher.set_connectivity_listener(callback);
    }

    pub fn set_reading_listener(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.dispatcher.set_reading_listener(callback);
    }

    pub fn set_stream_error_listener(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.dispatcher.set_stream_error_listener(callback);
    }

    /// Print a line of text.
    ///
    /// Label language: one `TEXT` line inside a standard job (geometry
    /// preamble, `CLS`, operation, `PRINT 1,1`). Receipt language: the
    /// initialize preamble followed by the GBK-encoded text.
    pub fn print_text(&self, content: &str) -> Result<(), EtiquetaError> {
        if content.is_empty() {
            return Err(EtiquetaError::MalformedInput("empty text".into()));
        }
        match self.language {
            Language::Label => self.submit_label_job(&[Command::Text {
                x: TEXT_X,
                y: TEXT_Y,
                font: TEXT_FONT.to_string(),
                rotation: 0,
                x_mul: 1,
                y_mul: 1,
                content: content.to_string(),
            }]),
            Language::Receipt => {
                let mut payload = escpos::init();
                payload.extend(escpos::text(content));
                self.submit(payload)
            }
        }
    }

    /// Print a 1D barcode (label language only).
    pub fn print_barcode(&self, content: &str, kind: &str, height: u32) -> Result<(), EtiquetaError> {
        if content.is_empty() {
            return Err(EtiquetaError::MalformedInput("empty barcode content".into()));
        }
        self.require_label("barcodes")?;
        self.submit_label_job(&[Command::Barcode {
            x: BARCODE_X,
            y: BARCODE_Y,
            kind: kind.to_string(),
            height,
            human_readable: true,
            rotation: 0,
            narrow: 2,
            wide: 2,
            content: content.to_string(),
        }])
    }

    /// Print a QR code with the given cell width (label language only).
    pub fn print_qr_code(&self, content: &str, cell_width: u8) -> Result<(), EtiquetaError> {
        if content.is_empty() {
            return Err(EtiquetaError::MalformedInput("empty QR content".into()));
        }
        self.require_label("QR codes")?;
        self.submit_label_job(&[Command::QrCode {
            x: QR_X,
            y: QR_Y,
            ecc: QrEccLevel::H,
            cell_width,
            rotation: 0,
            content: content.to_string(),
        }])
    }

    /// Rasterize and print an image (label language only).
    ///
    /// A zero-dimension image is rejected synchronously, before any I/O.
    pub fn print_image(&self, image: &RgbaImage) -> Result<(), EtiquetaError> {
        self.require_label("raster graphics")?;
        self.submit_label_job(&[Command::Image {
            x: 0,
            y: 0,
            bitmap: image.clone(),
        }])
    }

    /// Activate the cutter.
    pub fn cut_paper(&self) -> Result<(), EtiquetaError> {
        let payload = protocol::encode(&Command::Control(ControlCommand::Cut), self.language)?;
        self.submit(payload)
    }

    /// Advance paper. The receipt language feeds `lines` lines; the label
    /// language feeds one whole label regardless of the count.
    pub fn feed_paper(&self, lines: u32) -> Result<(), EtiquetaError> {
        let payload = protocol::encode(&Command::Control(ControlCommand::Feed(lines)), self.language)?;
        self.submit(payload)
    }

    /// Print the composed label buffer (label language only).
    pub fn print_label(&self, copies: u32, sets: u32) -> Result<(), EtiquetaError> {
        if copies == 0 || sets == 0 {
            return Err(EtiquetaError::MalformedInput(
                "copies and sets must be at least 1".into(),
            ));
        }
        let payload = protocol::encode(
            &Command::Control(ControlCommand::Print { copies, sets }),
            self.language,
        )?;
        self.submit(payload)
    }

    /// Send pre-built command bytes unchanged.
    pub fn print_raw(&self, bytes: Vec<u8>) -> Result<(), EtiquetaError> {
        if bytes.is_empty() {
            return Err(EtiquetaError::MalformedInput("empty raw payload".into()));
        }
        self.submit(bytes)
    }

    /// Encode and send an explicit command sequence as one label job:
    /// geometry preamble, `CLS`, the commands in order, `PRINT 1,1`.
    pub fn print_commands(&self, commands: &[Command]) -> Result<(), EtiquetaError> {
        self.require_label("composed label jobs")?;
        self.submit_label_job(commands)
    }

    fn require_label(&self, what: &'static str) -> Result<(), EtiquetaError> {
        match self.language {
            Language::Label => Ok(()),
            Language::Receipt => Err(EtiquetaError::Unsupported(what)),
        }
    }

    fn submit_label_job(&self, commands: &[Command]) -> Result<(), EtiquetaError> {
        let mut payload = self.label.preamble();
        payload.extend(tspl::cls());
        for command in commands {
            payload.extend(protocol::encode(command, Language::Label)?);
        }
        payload.extend(tspl::print(1, 1));
        self.submit(payload)
    }

    /// Gate on connectivity, then hand the encoded job to a worker
    /// thread. The worker serializes on the shared handle mutex, so jobs
    /// reach the wire whole and in lock-acquisition order.
    fn submit(&self, payload: Vec<u8>) -> Result<(), EtiquetaError> {
        let handle = {
            let guard = self.manager.lock().unwrap();
            let manager = guard.as_ref().ok_or(EtiquetaError::NotConnected)?;
            if !manager.is_connected() {
                return Err(EtiquetaError::NotConnected);
            }
            manager.shared_handle()
        };

        std::thread::Builder::new()
            .name("etiqueta-print-job".to_string())
            .spawn(move || {
                let mut guard = handle.lock().unwrap();
                match guard.as_mut() {
                    None => warn!("print job dropped: device detached before transfer"),
                    Some(conn) => {
                        if let Err(e) = conn.write(&payload) {
                            // Asynchronous completion: the failure is
                            // logged and the job dropped. Connection
                            // state only changes on a detach event.
                            let err = EtiquetaError::Transfer(e.to_string());
                            error!("print transfer failed: {err}");
                        }
                    }
                }
            })
            .map_err(EtiquetaError::Io)?;
        Ok(())
    }
}

impl Drop for PrinterService {
    fn drop(&mut self) {
        self.disconnect();
    }
}
