//! Error types for wirelesshex.

use std::io;
use thiserror::Error;

/// Result type for wirelesshex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for wirelesshex operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Invalid Intel-HEX record.
    #[error("Invalid HEX record: {0}")]
    InvalidRecord(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Image exceeds the storage region capacity.
    #[error("Image overflow: {written} bytes written, limit is {limit}")]
    Overflow {
        /// Image bytes written so far.
        written: u32,
        /// Maximum image size in bytes.
        limit: u32,
    },

    /// Storage device fault.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation interrupted by the embedding application.
    #[error("Interrupted")]
    Interrupted,
}
