//! # Device Transport Layer
//!
//! This module defines the boundary between the library core and the
//! platform's USB/serial plumbing. The library never talks to hardware
//! directly; an implementation of [`Transport`] is injected at service
//! construction and supplies device enumeration, handle acquisition and
//! bulk reads/writes. Attach/detach and permission-grant notifications
//! arrive as [`TransportEvent`] values on a channel owned by the caller.
//!
//! ## Available Implementations
//!
//! - [`mock`]: scripted in-memory transport for tests
//!
//! Real backends (libusb, Android USB host, a tty device node) live in the
//! embedding application; they only need to implement two small traits.

pub mod mock;

pub use mock::MockTransport;

/// Vendor/product pair identifying a class of physical device.
///
/// Matching is exact on both fields. The identity never changes for the
/// lifetime of a service; reconnect attempts always look for the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Asynchronous hardware notifications, delivered to the connection
/// manager over one channel so ordering is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A device appeared on the bus
    Attached(DeviceIdentity),
    /// A device left the bus
    Detached(DeviceIdentity),
    /// Outcome of a prior [`Transport::request_permission`] call
    PermissionResult {
        identity: DeviceIdentity,
        granted: bool,
    },
}

/// Why [`Transport::open_for_writing`] could not produce a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    /// The device exists but the platform requires a user permission grant
    /// first. Call [`Transport::request_permission`] and wait for a
    /// [`TransportEvent::PermissionResult`].
    PermissionRequired,
    /// No device with the requested identity is currently attached.
    NotFound,
    /// The device was found but claiming it failed (interface busy,
    /// endpoint missing, open error).
    Failed(&'static str),
}

/// Failure of a read or write on an open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError(pub String);

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransferError {}

/// Device discovery and handle acquisition.
///
/// Implementations are shared across the timer, event and worker threads,
/// so they must be `Send + Sync`. All methods are synchronous; permission
/// requests are fire-and-forget with the result arriving as an event.
pub trait Transport: Send + Sync + 'static {
    /// List currently attached devices. The `bool` is true when a usable
    /// handle could be opened right now without a permission grant.
    fn enumerate(&self) -> Vec<(DeviceIdentity, bool)>;

    /// Open a write-capable (and read-capable, where the hardware has an
    /// IN endpoint) handle to the device with the given identity.
    fn open_for_writing(
        &self,
        identity: DeviceIdentity,
    ) -> Result<Box<dyn Connection>, OpenError>;

    /// Ask the platform to prompt for access to the device. The outcome
    /// arrives later as [`TransportEvent::PermissionResult`].
    fn request_permission(&self, identity: DeviceIdentity);
}

/// An open handle to one physical device.
///
/// Writes are fire-and-forget at this level: success means the transfer
/// primitive accepted the bytes, nothing more. The handle is owned by the
/// connection manager and shared behind a mutex, which is the single
/// serialization point for concurrent print jobs.
pub trait Connection: Send {
    /// Write the full buffer or fail.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransferError>;

    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize, TransferError>;

    /// Read up to `max` currently-buffered bytes. `None` means nothing
    /// was available (a would-block, not an error).
    fn read_available(&mut self, max: usize) -> Result<Option<Vec<u8>>, TransferError>;
}
