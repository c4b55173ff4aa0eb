//! Error types for maxbl.
//!
//! Errors fall into three families which callers can branch on:
//!
//! - **transport** failures (the port could not be used, or the target
//!   answered with fewer bytes than the command requires),
//! - **device** failures (a well-formed response carried a non-success
//!   status byte),
//! - **local** validation failures (the request was rejected before anything
//!   was sent).

use crate::protocol::command::Status;
use crate::update::UpdateStep;
use std::io;
use thiserror::Error;

/// Result type for maxbl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Status code reported for transport-level failures.
pub const STATUS_UNKNOWN: i32 = 0xFF;

/// Status code reported for requests rejected before any device round-trip.
pub const STATUS_NOT_SENT: i32 = -1;

/// Error type for maxbl operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The target answered with fewer bytes than expected.
    #[error("Short response: expected {expected} bytes, got {actual}")]
    ShortResponse {
        /// Expected response length.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// The bridge did not accept the whole command.
    #[error("Incomplete write: bridge accepted {written} of {expected} bytes")]
    WriteIncomplete {
        /// Command length.
        expected: usize,
        /// Count reported by the bridge (or the port).
        written: i64,
    },

    /// The target kept answering "try again" until the polling window closed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The target reported a non-success status.
    #[error("Device error: {status}")]
    Device {
        /// Status byte returned by the target.
        status: Status,
    },

    /// The bridge adapter reported a non-zero status.
    #[error("Bridge error: status {status:#x}")]
    Bridge {
        /// Status word returned by the bridge.
        status: i32,
    },

    /// Malformed response framing.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Argument rejected locally.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Legacy bootloaders only accept four I2C addresses.
    #[error("Bootloader {version} does not support I2C address {addr:#04X}")]
    UnsupportedI2cAddress {
        /// Requested address.
        addr: u8,
        /// Bootloader version of the target.
        version: String,
    },

    /// Malformed AES key file.
    #[error("Invalid key file: {0}")]
    InvalidKeyFile(String),

    /// Invalid MSBL firmware container.
    #[error("Invalid MSBL: {0}")]
    InvalidImage(String),

    /// CRC32 checksum mismatch.
    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// CRC stored in the file.
        expected: u32,
        /// CRC computed over the file contents.
        actual: u32,
    },

    /// A preparatory update step failed.
    #[error("{step} failed: {source}")]
    UpdateStep {
        /// Step that failed.
        step: UpdateStep,
        /// Underlying error.
        source: Box<Error>,
    },

    /// Writing a page failed.
    #[error("Flashing page {}/{total} failed: {source}", .page + 1)]
    PageWrite {
        /// Zero-based index of the failing page.
        page: usize,
        /// Number of pages in the image.
        total: usize,
        /// Underlying error.
        source: Box<Error>,
    },

    /// The embedding application requested the operation to stop.
    #[error("Operation interrupted")]
    Interrupted,

    /// No serial port found.
    #[error("No serial port found")]
    DeviceNotFound,
}

impl Error {
    /// Numeric status used in human-readable status lines.
    ///
    /// Device statuses are reported verbatim, transport failures as `0xFF`
    /// and local validation failures as `-1`. The legacy I2C address
    /// rejection keeps its historical `0xFF`.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Device { status } => i32::from(status.code()),
            Self::Bridge { status } => *status,
            Self::InvalidArgument(_) | Self::InvalidKeyFile(_) | Self::InvalidImage(_) => {
                STATUS_NOT_SENT
            },
            Self::UpdateStep { source, .. } | Self::PageWrite { source, .. } => {
                source.status_code()
            },
            _ => STATUS_UNKNOWN,
        }
    }

    /// Whether the failure happened on the link rather than in the target.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::ShortResponse { .. }
            | Self::WriteIncomplete { .. }
            | Self::Timeout(_)
            | Self::Bridge { .. }
            | Self::Protocol(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            Self::UpdateStep { source, .. } | Self::PageWrite { source, .. } => {
                source.is_transport()
            },
            _ => false,
        }
    }

    /// Whether the target answered and rejected the command.
    pub fn is_device(&self) -> bool {
        match self {
            Self::Device { .. } => true,
            Self::UpdateStep { source, .. } | Self::PageWrite { source, .. } => source.is_device(),
            _ => false,
        }
    }

    /// Whether the request was rejected before anything was sent.
    pub fn is_local(&self) -> bool {
        match self {
            Self::InvalidArgument(_)
            | Self::UnsupportedI2cAddress { .. }
            | Self::InvalidKeyFile(_)
            | Self::InvalidImage(_)
            | Self::CrcMismatch { .. } => true,
            Self::UpdateStep { source, .. } | Self::PageWrite { source, .. } => source.is_local(),
            _ => false,
        }
    }
}
