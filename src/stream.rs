//! # Serial Stream Framing
//!
//! Turns the unbounded byte stream of an attached serial device (a
//! weighing scale, typically) into discrete hex-encoded readings.
//!
//! ## Framing Heuristic
//!
//! The scale protocol has no delimiter we can rely on, and UART transport
//! fragments messages across reads. The loop therefore infers message
//! boundaries from timing:
//!
//! 1. Poll `available()` every `POLL_INTERVAL` (20 ms).
//! 2. When bytes appear, wait one `QUIET_PERIOD` (50 ms) so the rest of
//!    the burst lands in the driver buffer.
//! 3. Read everything available, treat it as one complete message, encode
//!    it as upper-case hex and emit it as a [`PrinterEvent::Reading`].
//!
//! This is a heuristic, not a frame format: a reading split by more than
//! the quiet period arrives as two Readings. Accepted limitation until the
//! hardware protocol is documented with a real framing.
//!
//! ## Lifecycle
//!
//! One loop runs per active connection, on its own thread. Any I/O error
//! ends the loop permanently and is reported once as
//! [`PrinterEvent::StreamError`]; the connection manager starts a fresh
//! loop when it re-establishes a connection.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::EtiquetaError;
use crate::event::PrinterEvent;
use crate::transport::Connection;

/// Sleep between availability polls; bounds idle CPU usage.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settle time after the first bytes of a burst are seen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Upper bound on one read; comfortably above any scale message.
const MAX_READ: usize = 4096;

/// Encode bytes as an upper-case hex string, two digits per byte.
///
/// ```
/// assert_eq!(etiqueta::stream::to_hex_upper(&[0xDE, 0xAD, 0xBE, 0xEF]), "DEADBEEF");
/// ```
pub fn to_hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Shared handle slot; `None` once the connection is torn down.
pub type SharedConnection = Arc<Mutex<Option<Box<dyn Connection>>>>;

/// Read-loop body. Runs until cancellation, connection teardown or the
/// first I/O error. The handle mutex is held only for the brief
/// `available`/`read_available` calls, never across a sleep, so print
/// jobs are not starved.
pub fn run_read_loop(
    handle: SharedConnection,
    cancel: CancelToken,
    events: Sender<PrinterEvent>,
    poll_interval: Duration,
    quiet_period: Duration,
) {
    let mut frame: Vec<u8> = Vec::new();
    loop {
        if cancel.wait_timeout(poll_interval) {
            break;
        }

        let available = {
            let mut guard = handle.lock().unwrap();
            let Some(conn) = guard.as_mut() else {
                debug!("read loop: connection torn down, exiting");
                break;
            };
            match conn.available() {
                Ok(n) => n,
                Err(e) => {
                    let err = EtiquetaError::Stream(e.to_string());
                    warn!("read loop terminated: {err}");
                    let _ = events.send(PrinterEvent::StreamError(e.to_string()));
                    break;
                }
            }
        };
        if available == 0 {
            continue;
        }

        // Let the rest of the burst arrive before reading.
        if cancel.wait_timeout(quiet_period) {
            break;
        }

        let read = {
            let mut guard = handle.lock().unwrap();
            let Some(conn) = guard.as_mut() else {
                break;
            };
            conn.read_available(MAX_READ)
        };
        match read {
            Ok(Some(bytes)) => {
                frame.extend_from_slice(&bytes);
                let reading = to_hex_upper(&frame);
                frame.clear();
                debug!(reading, "framed serial message");
                if events.send(PrinterEvent::Reading(reading)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let err = EtiquetaError::Stream(e.to_string());
                warn!("read loop terminated: {err}");
                let _ = events.send(PrinterEvent::StreamError(e.to_string()));
                break;
            }
        }
    }
}
