//! Byte-stream port abstraction.
//!
//! The bootloader engine never talks to a serial device directly. It goes
//! through a [`Transport`](crate::connection::Transport), which in turn owns a
//! [`Port`]. Keeping the port behind a trait lets the protocol layers run
//! against in-memory mocks in tests.
//!
//! ```text
//! +-------------------------+
//! |  Bootloader / Bridge    |
//! +-----------+-------------+
//!             |
//!             v
//! +-----------+-------------+
//! |  Transport (open/close, |
//! |  read_packet, ...)      |
//! +-----------+-------------+
//!             |
//!             v
//! +-----------+-------------+
//! |  Port trait             |
//! +-----------+-------------+
//!             |
//!             v
//! +-----------+-------------+
//! |  NativePort (serialport)|
//! +-------------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the Maxim bootloader and the bridge adapter.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Serial port configuration.
///
/// The link is always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// An open byte stream to the adapter.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Discard anything pending in the input and output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release the device.
    ///
    /// Further I/O fails with `NotConnected`.
    fn close(&mut self) -> Result<()>;
}

/// Listing of available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0", 230400).with_timeout(Duration::from_secs(2));

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 230400);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }
}
