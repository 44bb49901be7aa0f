//! # Error Types
//!
//! This module defines error types used throughout the etiqueta library.
//!
//! All failures are surfaced as explicit values; none are fatal to the
//! process. Connectivity loss is recovered only by the connection manager's
//! periodic reconnect loop, never by per-call retries.

use thiserror::Error;

/// Main error type for etiqueta operations
#[derive(Debug, Error)]
pub enum EtiquetaError {
    /// A print operation was attempted while the printer is not connected
    #[error("Printer not connected")]
    NotConnected,

    /// No attached device matched the configured vendor/product identity
    #[error("Device not found")]
    DeviceNotFound,

    /// The user (or platform) denied access to the matched device
    #[error("USB permission denied")]
    PermissionDenied,

    /// A write or read on the device handle failed
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The serial read loop hit an I/O failure and terminated
    #[error("Stream error: {0}")]
    Stream(String),

    /// Input rejected before any I/O was attempted
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Operation not available in the selected printer language
    #[error("Operation not supported in this printer language: {0}")]
    Unsupported(&'static str),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
