//! # Connection Manager
//!
//! Reduces asynchronous hardware events (attach, detach, permission
//! grants, timer ticks) into one authoritative [`ConnectionState`] and a
//! deduplicated connected/disconnected signal.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected --tick--> Searching --no match--> Disconnected
//!                           |  match, handle opens
//!                           +--------------------> Connected
//!                           |  match, permission needed
//!                           +----> AwaitingPermission --granted--> Connected
//!                                        |                  \--open fails--> Disconnected
//!                                        +---denied---> Disconnected
//! Connected --detach of matched device--> Disconnected (unconditional)
//! ```
//!
//! The reconnect timer fires 100 ms after start, then every 2000 ms.
//! While an attempt is in Searching or AwaitingPermission, further ticks
//! are no-ops: at most one attempt is ever in flight. Attach events
//! trigger an out-of-band attempt, debounced so a flurry of notifications
//! causes at most one attempt per window.
//!
//! Permission denial and "device not found" are terminal outcomes of one
//! attempt, reported through the connectivity channel; the periodic timer
//! is the sole retry mechanism.
//!
//! On every transition to Connected the previous serial read loop is fully
//! stopped (cancelled and joined) before a fresh one starts on the new
//! handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::EtiquetaError;
use crate::event::PrinterEvent;
use crate::stream::{self, SharedConnection};
use crate::transport::{Connection, DeviceIdentity, OpenError, Transport, TransportEvent};

/// Period of the reconnect timer.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);

/// Delay before the first reconnect attempt.
pub const INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Window within which repeated attach notifications coalesce into one
/// out-of-band attempt.
pub const ATTACH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Authoritative connection status. Exactly one instance per manager;
/// mutated only by the manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Searching,
    AwaitingPermission,
    Connected,
}

struct ReaderHandle {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    identity: DeviceIdentity,
    state: Mutex<ConnectionState>,
    handle: SharedConnection,
    /// Last value sent on the connectivity channel; used to report only
    /// on change, never on every poll.
    last_reported: Mutex<Option<bool>>,
    last_attach_attempt: Mutex<Option<Instant>>,
    events: Sender<PrinterEvent>,
    reader: Mutex<Option<ReaderHandle>>,
    /// Bumped on every forced disconnect. An attempt snapshots it when it
    /// enters Searching; a mismatch at establish time means the matched
    /// device detached while the open was in flight and the handle is
    /// stale.
    generation: AtomicU64,
    attempt_generation: Mutex<u64>,
}

impl ManagerInner {
    fn report(&self, connected: bool) {
        let mut last = self.last_reported.lock().unwrap();
        if *last == Some(connected) {
            return;
        }
        *last = Some(connected);
        info!(connected, device = %self.identity, "connectivity changed");
        let _ = self.events.send(PrinterEvent::Connectivity(connected));
    }

    /// One discovery/permission attempt. No-op while a previous attempt
    /// is still in Searching or AwaitingPermission, or while connected
    /// with a live handle.
    fn try_connect(&self) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ConnectionState::Connected => {
                    if self.handle.lock().unwrap().is_some() {
                        self.report(true);
                        return;
                    }
                    // Handle lost without a detach event; fall through to
                    // a fresh search.
                }
                ConnectionState::Searching | ConnectionState::AwaitingPermission => return,
                ConnectionState::Disconnected => {}
            }
            *state = ConnectionState::Searching;
            *self.attempt_generation.lock().unwrap() = self.generation.load(Ordering::SeqCst);
        }

        let matched = self
            .transport
            .enumerate()
            .iter()
            .any(|(id, _)| *id == self.identity);
        if !matched {
            debug!(device = %self.identity, "attempt failed: {}", EtiquetaError::DeviceNotFound);
            self.fail_attempt();
            return;
        }

        match self.transport.open_for_writing(self.identity) {
            Ok(conn) => self.establish(conn),
            Err(OpenError::PermissionRequired) => {
                info!(device = %self.identity, "requesting device permission");
                self.transport.request_permission(self.identity);
                *self.state.lock().unwrap() = ConnectionState::AwaitingPermission;
            }
            Err(OpenError::NotFound) => {
                self.fail_attempt();
            }
            Err(OpenError::Failed(reason)) => {
                warn!(device = %self.identity, reason, "failed to claim device");
                self.fail_attempt();
            }
        }
    }

    fn fail_attempt(&self) {
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
        self.report(false);
    }

    fn establish(&self, conn: Box<dyn Connection>) {
        // Fully stop the previous read loop before the new handle goes
        // live; exactly one loop may exist at a time.
        self.stop_reader();
        {
            let mut state = self.state.lock().unwrap();
            let attempt = *self.attempt_generation.lock().unwrap();
            if self.generation.load(Ordering::SeqCst) != attempt {
                // The matched device detached while open_for_writing was
                // in flight; discard the stale handle instead of going
                // Connected to a device that left the bus.
                warn!(device = %self.identity, "device detached during open, discarding handle");
                *state = ConnectionState::Disconnected;
                drop(state);
                self.report(false);
                return;
            }
            *self.handle.lock().unwrap() = Some(conn);
            *state = ConnectionState::Connected;
        }
        info!(device = %self.identity, "device connected");
        self.start_reader();
        self.report(true);
    }

    /// Spawn failure leaves the connection writable but without serial
    /// readings; the listener is told through the stream error channel.
    fn start_reader(&self) {
        let cancel = CancelToken::new();
        let handle = Arc::clone(&self.handle);
        let events = self.events.clone();
        let loop_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("etiqueta-read-loop".to_string())
            .spawn(move || {
                stream::run_read_loop(
                    handle,
                    loop_cancel,
                    events,
                    stream::POLL_INTERVAL,
                    stream::QUIET_PERIOD,
                )
            });
        match spawned {
            Ok(thread) => {
                *self.reader.lock().unwrap() = Some(ReaderHandle { cancel, thread });
            }
            Err(e) => {
                let err = EtiquetaError::Io(e);
                warn!("read loop not started: {err}");
                let _ = self.events.send(PrinterEvent::StreamError(err.to_string()));
            }
        }
    }

    fn stop_reader(&self) {
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.cancel.cancel();
            let _ = reader.thread.join();
        }
    }

    /// Detach of the matched device forces Disconnected unconditionally,
    /// regardless of any reconnect attempt in progress.
    fn force_disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            // Lock order is state then handle, same as try_connect and
            // establish.
            let mut state = self.state.lock().unwrap();
            self.handle.lock().unwrap().take();
            *state = ConnectionState::Disconnected;
        }
        self.stop_reader();
        self.report(false);
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Attached(identity) => {
                debug!(device = %identity, "device attached");
                if *self.state.lock().unwrap() == ConnectionState::Connected {
                    return;
                }
                {
                    let mut last = self.last_attach_attempt.lock().unwrap();
                    let now = Instant::now();
                    if let Some(prev) = *last {
                        if now.duration_since(prev) < ATTACH_DEBOUNCE {
                            return;
                        }
                    }
                    *last = Some(now);
                }
                self.try_connect();
            }
            TransportEvent::Detached(identity) => {
                if identity != self.identity {
                    return;
                }
                warn!(device = %identity, "matched device detached");
                self.force_disconnect();
            }
            TransportEvent::PermissionResult { identity, granted } => {
                if identity != self.identity {
                    return;
                }
                if !granted {
                    warn!(device = %identity, "attempt failed: {}", EtiquetaError::PermissionDenied);
                    self.fail_attempt();
                    return;
                }
                info!(device = %identity, "device permission granted");
                match self.transport.open_for_writing(self.identity) {
                    Ok(conn) => self.establish(conn),
                    Err(_) => self.fail_attempt(),
                }
            }
        }
    }
}

/// Owns device discovery, the permission flow and the reconnect loop.
///
/// Construct with [`ConnectionManager::new`], then call
/// [`ConnectionManager::start`] to spawn the timer and event threads.
/// Dropping the manager (or calling [`ConnectionManager::shutdown`])
/// cancels and joins every thread it owns, including the read loop.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
    cancel: CancelToken,
    timer_thread: Option<JoinHandle<()>>,
    event_thread: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: DeviceIdentity,
        events: Sender<PrinterEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                identity,
                state: Mutex::new(ConnectionState::Disconnected),
                handle: Arc::new(Mutex::new(None)),
                last_reported: Mutex::new(None),
                last_attach_attempt: Mutex::new(None),
                events,
                reader: Mutex::new(None),
                generation: AtomicU64::new(0),
                attempt_generation: Mutex::new(0),
            }),
            cancel: CancelToken::new(),
            timer_thread: None,
            event_thread: None,
        }
    }

    /// Spawn the reconnect timer and the transport event pump.
    pub fn start(&mut self, transport_events: Receiver<TransportEvent>) -> Result<(), EtiquetaError> {
        self.start_with_intervals(transport_events, INITIAL_DELAY, RECONNECT_INTERVAL)
    }

    /// As [`start`](Self::start) but with custom timing; used by tests to
    /// keep the reconnect cycle fast.
    ///
    /// On error the manager is left stopped; dropping it joins whatever
    /// did spawn.
    pub fn start_with_intervals(
        &mut self,
        transport_events: Receiver<TransportEvent>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<(), EtiquetaError> {
        let timer_inner = Arc::clone(&self.inner);
        let timer_cancel = self.cancel.clone();
        self.timer_thread = Some(
            std::thread::Builder::new()
                .name("etiqueta-reconnect".to_string())
                .spawn(move || {
                    if timer_cancel.wait_timeout(initial_delay) {
                        return;
                    }
                    loop {
                        timer_inner.try_connect();
                        if timer_cancel.wait_timeout(interval) {
                            return;
                        }
                    }
                })
                .map_err(EtiquetaError::Io)?,
        );

        let event_inner = Arc::clone(&self.inner);
        let event_cancel = self.cancel.clone();
        self.event_thread = Some(
            std::thread::Builder::new()
                .name("etiqueta-transport-events".to_string())
                .spawn(move || {
                    while !event_cancel.is_cancelled() {
                        match transport_events.recv_timeout(Duration::from_millis(50)) {
                            Ok(event) => event_inner.handle_event(event),
                            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .map_err(EtiquetaError::Io)?,
        );
        Ok(())
    }

    /// The handle slot shared with print workers and the read loop.
    pub fn shared_handle(&self) -> SharedConnection {
        Arc::clone(&self.inner.handle)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.inner.handle.lock().unwrap().is_some()
    }

    /// Drive one reconnect attempt synchronously. The timer thread calls
    /// this on its own; it is public for out-of-band triggers and tests.
    pub fn try_connect(&self) {
        self.inner.try_connect();
    }

    /// Feed one transport event synchronously; the event pump thread
    /// calls this on its own.
    pub fn handle_event(&self, event: TransportEvent) {
        self.inner.handle_event(event);
    }

    /// Stop the timer, the event pump and the read loop, join them all
    /// and release the device handle.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.timer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.event_thread.take() {
            let _ = thread.join();
        }
        self.inner.stop_reader();
        self.inner.handle.lock().unwrap().take();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::mpsc::channel;

    const PRINTER: DeviceIdentity = DeviceIdentity::new(19267, 13624);
    const OTHER: DeviceIdentity = DeviceIdentity::new(1, 2);

    fn manager(transport: &MockTransport) -> (ConnectionManager, std::sync::mpsc::Receiver<PrinterEvent>) {
        let (tx, rx) = channel();
        (
            ConnectionManager::new(Arc::new(transport.clone()), PRINTER, tx),
            rx,
        )
    }

    fn connectivity_events(rx: &std::sync::mpsc::Receiver<PrinterEvent>) -> Vec<bool> {
        rx.try_iter()
            .filter_map(|event| match event {
                PrinterEvent::Connectivity(connected) => Some(connected),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_no_device_reports_false_once() {
        let transport = MockTransport::new();
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        mgr.try_connect();
        mgr.try_connect();

        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(connectivity_events(&rx), vec![false]);
    }

    #[test]
    fn test_connectable_device_connects() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, true);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();

        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert!(mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![true]);
    }

    #[test]
    fn test_permission_granted_connects() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, false);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        assert_eq!(mgr.state(), ConnectionState::AwaitingPermission);
        assert_eq!(transport.permission_requests(), vec![PRINTER]);

        transport.grant(PRINTER);
        mgr.handle_event(TransportEvent::PermissionResult {
            identity: PRINTER,
            granted: true,
        });

        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(connectivity_events(&rx), vec![true]);
    }

    #[test]
    fn test_permission_denied_disconnects() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, false);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        mgr.handle_event(TransportEvent::PermissionResult {
            identity: PRINTER,
            granted: false,
        });

        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert_eq!(connectivity_events(&rx), vec![false]);
    }

    #[test]
    fn test_tick_is_noop_while_awaiting_permission() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, false);
        let (mgr, _rx) = manager(&transport);

        mgr.try_connect();
        mgr.try_connect();
        mgr.try_connect();

        // One attempt in flight: permission was requested exactly once.
        assert_eq!(transport.permission_requests(), vec![PRINTER]);
        assert_eq!(mgr.state(), ConnectionState::AwaitingPermission);
    }

    #[test]
    fn test_detach_forces_disconnect() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, true);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        assert!(mgr.is_connected());

        transport.detach(PRINTER);
        mgr.handle_event(TransportEvent::Detached(PRINTER));

        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(!mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![true, false]);
    }

    #[test]
    fn test_detach_of_other_device_ignored() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, true);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        mgr.handle_event(TransportEvent::Detached(OTHER));

        assert!(mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![true]);
    }

    #[test]
    fn test_attach_triggers_out_of_band_attempt() {
        let transport = MockTransport::new();
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        assert_eq!(connectivity_events(&rx), vec![false]);

        transport.attach(PRINTER, true);
        mgr.handle_event(TransportEvent::Attached(PRINTER));

        assert!(mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![true]);
    }

    #[test]
    fn test_attach_flurry_is_debounced() {
        let transport = MockTransport::new();
        let (mgr, _rx) = manager(&transport);

        // Device never becomes connectable, so each attach attempt that
        // goes through asks for permission.
        transport.attach(PRINTER, false);
        mgr.handle_event(TransportEvent::Attached(PRINTER));
        // A successful attempt leaves AwaitingPermission; reset so the
        // debounce window alone gates the next attempt.
        mgr.inner.fail_attempt();
        mgr.handle_event(TransportEvent::Attached(PRINTER));
        mgr.handle_event(TransportEvent::Attached(PRINTER));

        assert_eq!(transport.permission_requests(), vec![PRINTER]);
    }

    /// Transport whose `open_for_writing` parks until told to proceed,
    /// so a detach can be delivered while the open is in flight.
    struct GatedTransport {
        identity: DeviceIdentity,
        entered: Sender<()>,
        release: Mutex<Receiver<()>>,
    }

    impl Transport for GatedTransport {
        fn enumerate(&self) -> Vec<(DeviceIdentity, bool)> {
            vec![(self.identity, true)]
        }

        fn open_for_writing(
            &self,
            _identity: DeviceIdentity,
        ) -> Result<Box<dyn Connection>, OpenError> {
            let _ = self.entered.send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(Box::new(IdleConnection))
        }

        fn request_permission(&self, _identity: DeviceIdentity) {}
    }

    struct IdleConnection;

    impl Connection for IdleConnection {
        fn write(&mut self, _bytes: &[u8]) -> Result<(), crate::transport::TransferError> {
            Ok(())
        }

        fn available(&mut self) -> Result<usize, crate::transport::TransferError> {
            Ok(0)
        }

        fn read_available(
            &mut self,
            _max: usize,
        ) -> Result<Option<Vec<u8>>, crate::transport::TransferError> {
            Ok(None)
        }
    }

    #[test]
    fn test_detach_during_open_discards_stale_handle() {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let transport = Arc::new(GatedTransport {
            identity: PRINTER,
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let (events_tx, rx) = channel();
        let mgr = ConnectionManager::new(transport, PRINTER, events_tx);

        let inner = Arc::clone(&mgr.inner);
        let attempt = std::thread::spawn(move || inner.try_connect());

        // The attempt is parked inside open_for_writing; detach the
        // device out from under it.
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        mgr.handle_event(TransportEvent::Detached(PRINTER));
        assert_eq!(mgr.state(), ConnectionState::Disconnected);

        release_tx.send(()).unwrap();
        attempt.join().unwrap();

        // The late handle is stale and must not resurrect Connected.
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(!mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![false]);
    }

    #[test]
    fn test_reconnect_after_detach() {
        let transport = MockTransport::new();
        transport.attach(PRINTER, true);
        let (mgr, rx) = manager(&transport);

        mgr.try_connect();
        transport.detach(PRINTER);
        mgr.handle_event(TransportEvent::Detached(PRINTER));
        transport.attach(PRINTER, true);
        mgr.try_connect();

        assert!(mgr.is_connected());
        assert_eq!(connectivity_events(&rx), vec![true, false, true]);
    }
}
