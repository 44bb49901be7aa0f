//! # Listener Event Dispatch
//!
//! Connectivity changes, scale readings and stream failures are observed
//! on several threads (timer, event pump, read loop) but must reach the
//! registered listeners in observation order and never from an arbitrary
//! worker thread. All producers send [`PrinterEvent`] values into one
//! channel; a single dispatcher thread drains it and invokes the matching
//! callback slot. Listener reentrancy is therefore impossible and ordering
//! follows channel order.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::EtiquetaError;

/// One observation delivered to the listener set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterEvent {
    /// The authoritative connected/disconnected status changed
    Connectivity(bool),
    /// One framed serial reading, upper-case hex
    Reading(String),
    /// The serial read loop terminated on an I/O failure
    StreamError(String),
}

type ConnectivityCallback = Arc<dyn Fn(bool) + Send + Sync>;
type ReadingCallback = Arc<dyn Fn(&str) + Send + Sync>;
type StreamErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Registered callback slots. Each slot is independent; unset slots drop
/// their events.
#[derive(Default)]
pub struct Listeners {
    pub connectivity: Option<ConnectivityCallback>,
    pub reading: Option<ReadingCallback>,
    pub stream_error: Option<StreamErrorCallback>,
}

/// Owns the event channel and the dispatcher thread.
pub struct EventDispatcher {
    tx: Sender<PrinterEvent>,
    listeners: Arc<Mutex<Listeners>>,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Spawn the dispatcher thread. It exits when every sender clone has
    /// been dropped.
    pub fn start() -> Result<Self, EtiquetaError> {
        let (tx, rx) = channel::<PrinterEvent>();
        let listeners: Arc<Mutex<Listeners>> = Arc::default();
        let thread_listeners = Arc::clone(&listeners);
        let thread = std::thread::Builder::new()
            .name("etiqueta-events".to_string())
            .spawn(move || dispatch_loop(rx, thread_listeners))
            .map_err(EtiquetaError::Io)?;
        Ok(Self {
            tx,
            listeners,
            thread: Some(thread),
        })
    }

    /// A sender for producer threads.
    pub fn sender(&self) -> Sender<PrinterEvent> {
        self.tx.clone()
    }

    pub fn set_connectivity_listener(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().connectivity = Some(Arc::new(callback));
    }

    pub fn set_reading_listener(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().reading = Some(Arc::new(callback));
    }

    pub fn set_stream_error_listener(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().stream_error = Some(Arc::new(callback));
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        // Dropping our sender closes the channel once producers are gone;
        // the service drops its producer clones before dropping us.
        drop(std::mem::replace(&mut self.tx, channel().0));
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn dispatch_loop(rx: Receiver<PrinterEvent>, listeners: Arc<Mutex<Listeners>>) {
    while let Ok(event) = rx.recv() {
        debug!(?event, "dispatching printer event");
        // Clone the slot out of the lock before invoking, so a callback
        // may itself register or replace listeners without deadlocking
        // on the slot mutex.
        match event {
            PrinterEvent::Connectivity(connected) => {
                let cb = listeners.lock().unwrap().connectivity.clone();
                if let Some(cb) = cb {
                    cb(connected);
                }
            }
            PrinterEvent::Reading(hex) => {
                let cb = listeners.lock().unwrap().reading.clone();
                if let Some(cb) = cb {
                    cb(&hex);
                }
            }
            PrinterEvent::StreamError(message) => {
                let cb = listeners.lock().unwrap().stream_error.clone();
                if let Some(cb) = cb {
                    cb(&message);
                }
            }
        }
    }
}
