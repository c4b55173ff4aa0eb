//! Bridge session settings.
//!
//! These values describe how the host reaches the target: which bus the
//! bridge adapter forwards to, which adapter GPIOs drive the target's reset
//! and MFIO lines, and the target's I2C address.

use {
    crate::error::{Error, Result},
    std::{fmt, str::FromStr},
};

/// Bus the bridge adapter forwards bootloader traffic to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum BridgeMode {
    /// I2C, commands wrapped in start/stop frames.
    I2c,
    /// SPI, commands wrapped in start/stop frames.
    Spi,
    /// UART0, raw pass-through.
    #[default]
    Uart0,
    /// UART2, raw pass-through.
    Uart2,
    /// Bridge idle.
    Idle,
}

impl BridgeMode {
    /// All modes, in display order.
    pub const ALL: [Self; 5] = [Self::I2c, Self::Spi, Self::Uart0, Self::Uart2, Self::Idle];

    /// ASCII name sent to the bridge.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::I2c => "I2C",
            Self::Spi => "SPI",
            Self::Uart0 => "UART0",
            Self::Uart2 => "UART2",
            Self::Idle => "IDLE",
        }
    }

    /// Whether bootloader bytes pass through unframed.
    pub fn is_uart(self) -> bool {
        matches!(self, Self::Uart0 | Self::Uart2)
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| {
                mode.as_str()
                    .eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| Error::InvalidArgument(format!("unknown bridge mode '{s}'")))
    }
}

/// One of the two bridge adapter GPIOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GpioPin {
    /// GPIO 0.
    Gpio0,
    /// GPIO 1.
    Gpio1,
}

impl GpioPin {
    /// Pin number.
    pub fn index(self) -> u8 {
        match self {
            Self::Gpio0 => 0,
            Self::Gpio1 => 1,
        }
    }

    /// Pin from its number.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Self::Gpio0),
            1 => Ok(Self::Gpio1),
            n => Err(Error::InvalidArgument(format!("bridge GPIO {n} does not exist"))),
        }
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.index())
    }
}

/// Default 7-bit I2C address of the bootloader.
pub const DEFAULT_I2C_ADDR: u8 = 0x55;

/// Settings for one bootloader session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BridgeSettings {
    /// Bus used to reach the target.
    pub mode: BridgeMode,
    /// GPIO wired to the target's reset line.
    pub reset_pin: GpioPin,
    /// GPIO wired to the target's MFIO line.
    pub mfio_pin: GpioPin,
    /// Level that asserts MFIO (`true` = high).
    pub mfio_polarity: bool,
    /// Target I2C address (7-bit).
    pub i2c_addr: u8,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            mode: BridgeMode::Uart0,
            reset_pin: GpioPin::Gpio0,
            mfio_pin: GpioPin::Gpio1,
            mfio_polarity: false,
            i2c_addr: DEFAULT_I2C_ADDR,
        }
    }
}

impl BridgeSettings {
    /// Set the bus.
    #[must_use]
    pub fn with_mode(mut self, mode: BridgeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the reset and MFIO pins.
    #[must_use]
    pub fn with_pins(mut self, reset_pin: GpioPin, mfio_pin: GpioPin) -> Self {
        self.reset_pin = reset_pin;
        self.mfio_pin = mfio_pin;
        self
    }

    /// Set the MFIO assert level.
    #[must_use]
    pub fn with_mfio_polarity(mut self, high: bool) -> Self {
        self.mfio_polarity = high;
        self
    }

    /// Set the target I2C address.
    #[must_use]
    pub fn with_i2c_addr(mut self, addr: u8) -> Self {
        self.i2c_addr = addr;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = BridgeSettings::default();
        assert_eq!(s.mode, BridgeMode::Uart0);
        assert_eq!(s.reset_pin, GpioPin::Gpio0);
        assert_eq!(s.mfio_pin, GpioPin::Gpio1);
        assert!(!s.mfio_polarity);
        assert_eq!(s.i2c_addr, 0x55);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("i2c".parse::<BridgeMode>().unwrap(), BridgeMode::I2c);
        assert_eq!("UART2".parse::<BridgeMode>().unwrap(), BridgeMode::Uart2);
        assert!("usb".parse::<BridgeMode>().is_err());
        assert!(BridgeMode::Uart0.is_uart());
        assert!(!BridgeMode::Spi.is_uart());
    }

    #[test]
    fn test_gpio_from_index() {
        assert_eq!(GpioPin::from_index(1).unwrap(), GpioPin::Gpio1);
        assert!(GpioPin::from_index(2).is_err());
        assert_eq!(GpioPin::Gpio0.to_string(), "GPIO0");
    }

    #[test]
    fn test_builder() {
        let s = BridgeSettings::default()
            .with_mode(BridgeMode::I2c)
            .with_pins(GpioPin::Gpio1, GpioPin::Gpio0)
            .with_mfio_polarity(true)
            .with_i2c_addr(0x5A);
        assert_eq!(s.mode, BridgeMode::I2c);
        assert_eq!(s.reset_pin, GpioPin::Gpio1);
        assert!(s.mfio_polarity);
        assert_eq!(s.i2c_addr, 0x5A);
    }
}
