//! # maxbl
//!
//! A host library for the Maxim/ADI secure bootloader.
//!
//! This crate talks to MAX32xxx/MAX78000 bootloaders either directly over a
//! UART or through a MAX32625PICO bridge that tunnels I2C/SPI traffic over
//! USB serial. It provides:
//!
//! - Length-prefixed packet transport over a serial port
//! - The bridge multiplexer (mode switch, GPIO, pull-ups)
//! - The bootloader command set (flash sequence, identity, configuration)
//! - MSBL firmware container and AES key file readers
//! - An end-to-end firmware update sequence with progress reporting
//!
//! ## Features
//!
//! - `native` (default): Serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use maxbl::{Bootloader, BridgeMode, BridgeSettings, Msbl, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = Msbl::from_file("firmware.msbl")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let transport = maxbl::SerialTransport::new(SerialConfig::new("/dev/ttyACM0", 115_200));
//!         let settings = BridgeSettings::default().with_mode(BridgeMode::I2c);
//!         let mut bl = Bootloader::new(transport, settings);
//!
//!         bl.bridge().switch_mode(BridgeMode::I2c)?;
//!         maxbl::update_firmware(&mut bl, &image, |done, total| {
//!             println!("Flashed {done}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod bootloader;
pub mod connection;
pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod settings;
pub mod target;
pub mod update;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

/// Serializes tests that depend on the global interrupt flag.
#[cfg(test)]
pub(crate) fn interrupt_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(feature = "native")]
pub use {
    connection::SerialTransport,
    device::auto_detect_port,
    device::detect_ports,
    port::{NativePort, NativePortEnumerator},
};
pub use {
    bootloader::{
        Bootloader, BootloaderConfig, BootloaderVersion, ConfigItem, ConfigLayout, ExitMode,
        Polling,
    },
    connection::{Packet, Transport},
    device::{DetectedPort, DeviceKind, format_port_list},
    error::{Error, Result},
    image::{AesKeyFile, Msbl, MsblHeader},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Bridge, Command, Status},
    settings::{BridgeMode, BridgeSettings, GpioPin},
    target::TargetPart,
    update::{UpdateStep, update_firmware, update_from_file},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        let _guard = interrupt_test_lock();
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
