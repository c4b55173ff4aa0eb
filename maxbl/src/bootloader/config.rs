//! Bootloader configuration word.
//!
//! The configuration is read back as one big-endian word whose fields are
//! numbered from the least significant bit. Two layouts exist:
//!
//! ```text
//! field             legacy (32-bit)    current (64-bit)
//! enter_bl_check    0                  0
//! ebl_pin           1..=4              1..=4
//! ebl_polarity      5                  5..=6
//! ebl_port          6..=7              -
//! uart_enable       8                  8
//! i2c_enable        9                  9
//! spi_enable        10                 10
//! i2c_addr          11..=12 (index)    32..=38 (address)
//! ebl_timeout       16..=19            16..=19
//! exit_bl_mode      20..=21            20..=21
//! crc_check         24                 24
//! valid_mark_check  25                 25
//! lock_swd          26                 26
//! ```

use {
    crate::{
        bootloader::version::BootloaderVersion,
        error::{Error, Result},
    },
    byteorder::{BigEndian, ReadBytesExt},
    std::{fmt, io::Cursor},
};

/// I2C addresses selectable on legacy bootloaders, by index.
pub const LEGACY_I2C_ADDRS: [u8; 4] = [0x58, 0x5A, 0x5C, 0xAA];

/// Index of `addr` in [`LEGACY_I2C_ADDRS`].
pub fn legacy_i2c_index(addr: u8) -> Option<u8> {
    LEGACY_I2C_ADDRS
        .iter()
        .position(|&a| a == addr)
        .and_then(|i| u8::try_from(i).ok())
}

/// Configuration word layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigLayout {
    /// 32-bit word, bootloaders up to v3.4.1.
    Legacy,
    /// 64-bit word, bootloaders from v3.4.2.
    Current,
}

impl ConfigLayout {
    /// Layout used by the given bootloader version.
    pub fn for_version(version: BootloaderVersion) -> Self {
        if version.is_legacy() {
            Self::Legacy
        } else {
            Self::Current
        }
    }

    /// Expected `READ_ALL` response length, status byte included.
    pub fn response_len(self) -> usize {
        match self {
            Self::Legacy => 5,
            Self::Current => 9,
        }
    }
}

/// Writable configuration items (`ENTRY_CONFIG` item byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigItem {
    /// Check the EBL pin at boot.
    EnterBlCheck = 0,
    /// EBL pin, encoded as `(port << 6) | pin`.
    EblPin = 1,
    /// EBL pin active level.
    EblPolarity = 2,
    /// Check the application valid mark.
    ValidMarkCheck = 3,
    /// Enable the UART interface.
    UartEnable = 4,
    /// Enable the I2C interface.
    I2cEnable = 5,
    /// Enable the SPI interface.
    SpiEnable = 6,
    /// I2C slave address (index on legacy bootloaders).
    I2cAddr = 7,
    /// Check the application CRC.
    CrcCheck = 8,
    /// Lock the SWD port.
    LockSwd = 9,
}

/// What the bootloader does when no host talks to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExitMode {
    /// Jump to the application immediately.
    Immediate,
    /// Jump after the configured timeout.
    Timeout,
    /// Stay in the bootloader.
    Indefinite,
    /// Unassigned field value 3.
    Reserved,
}

impl ExitMode {
    /// Field value.
    pub fn code(self) -> u8 {
        match self {
            Self::Immediate => 0,
            Self::Timeout => 1,
            Self::Indefinite => 2,
            Self::Reserved => 3,
        }
    }

    /// Decode the 2-bit field.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Immediate,
            1 => Self::Timeout,
            2 => Self::Indefinite,
            _ => Self::Reserved,
        }
    }
}

impl fmt::Display for ExitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediate",
            Self::Timeout => "timeout",
            Self::Indefinite => "indefinite",
            Self::Reserved => "reserved",
        })
    }
}

/// Decoded bootloader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BootloaderConfig {
    /// Layout the word was decoded from.
    pub layout: ConfigLayout,
    /// Check the EBL pin at boot.
    pub enter_bl_check: bool,
    /// EBL pin number.
    pub ebl_pin: u8,
    /// EBL port (legacy layout only, 0 otherwise).
    pub ebl_port: u8,
    /// EBL active level (1 bit legacy, 2 bits current).
    pub ebl_polarity: u8,
    /// UART interface enabled.
    pub uart_enable: bool,
    /// I2C interface enabled.
    pub i2c_enable: bool,
    /// SPI interface enabled.
    pub spi_enable: bool,
    /// I2C slave address (legacy indices are resolved to the address).
    pub i2c_addr: u8,
    /// Exit timeout exponent: the timeout is `2^ebl_timeout` ms.
    pub ebl_timeout: u8,
    /// Exit behaviour.
    pub exit_mode: ExitMode,
    /// Check the application CRC.
    pub crc_check: bool,
    /// Check the application valid mark.
    pub valid_mark_check: bool,
    /// SWD locked.
    pub lock_swd: bool,
}

fn bits(word: u64, lo: u32, width: u32) -> u8 {
    #[allow(clippy::cast_possible_truncation)] // width <= 8
    let value = ((word >> lo) & ((1 << width) - 1)) as u8;
    value
}

fn flag(word: u64, bit: u32) -> bool {
    (word >> bit) & 1 == 1
}

impl BootloaderConfig {
    /// Decode a configuration word.
    pub fn from_word(layout: ConfigLayout, word: u64) -> Self {
        let (ebl_polarity, ebl_port, i2c_addr) = match layout {
            ConfigLayout::Legacy => {
                let index = usize::from(bits(word, 11, 2));
                (bits(word, 5, 1), bits(word, 6, 2), LEGACY_I2C_ADDRS[index])
            },
            ConfigLayout::Current => (bits(word, 5, 2), 0, bits(word, 32, 7)),
        };

        Self {
            layout,
            enter_bl_check: flag(word, 0),
            ebl_pin: bits(word, 1, 4),
            ebl_port,
            ebl_polarity,
            uart_enable: flag(word, 8),
            i2c_enable: flag(word, 9),
            spi_enable: flag(word, 10),
            i2c_addr,
            ebl_timeout: bits(word, 16, 4),
            exit_mode: ExitMode::from_bits(bits(word, 20, 2)),
            crc_check: flag(word, 24),
            valid_mark_check: flag(word, 25),
            lock_swd: flag(word, 26),
        }
    }

    /// Decode a `READ_ALL` response (status byte followed by the word).
    pub fn from_response(layout: ConfigLayout, rsp: &[u8]) -> Result<Self> {
        if rsp.len() != layout.response_len() {
            return Err(Error::ShortResponse {
                expected: layout.response_len(),
                actual: rsp.len(),
            });
        }
        let mut cursor = Cursor::new(&rsp[1..]);
        let word = match layout {
            ConfigLayout::Legacy => u64::from(cursor.read_u32::<BigEndian>()?),
            ConfigLayout::Current => cursor.read_u64::<BigEndian>()?,
        };
        Ok(Self::from_word(layout, word))
    }

    /// Encode back to a configuration word.
    ///
    /// Reserved bits are zero. On the legacy layout an address outside
    /// [`LEGACY_I2C_ADDRS`] cannot be represented and is an error.
    pub fn to_word(&self) -> Result<u64> {
        let mut word = u64::from(self.enter_bl_check)
            | u64::from(self.ebl_pin & 0x0F) << 1
            | u64::from(self.uart_enable) << 8
            | u64::from(self.i2c_enable) << 9
            | u64::from(self.spi_enable) << 10
            | u64::from(self.ebl_timeout & 0x0F) << 16
            | u64::from(self.exit_mode.code()) << 20
            | u64::from(self.crc_check) << 24
            | u64::from(self.valid_mark_check) << 25
            | u64::from(self.lock_swd) << 26;

        match self.layout {
            ConfigLayout::Legacy => {
                let index = legacy_i2c_index(self.i2c_addr).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "I2C address {:#04X} has no legacy encoding",
                        self.i2c_addr
                    ))
                })?;
                word |= u64::from(self.ebl_polarity & 0x01) << 5
                    | u64::from(self.ebl_port & 0x03) << 6
                    | u64::from(index) << 11;
            },
            ConfigLayout::Current => {
                word |= u64::from(self.ebl_polarity & 0x03) << 5
                    | u64::from(self.i2c_addr & 0x7F) << 32;
            },
        }
        Ok(word)
    }

    /// Exit timeout in milliseconds.
    pub fn exit_timeout_ms(&self) -> u32 {
        1u32 << self.ebl_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_i2c_index() {
        assert_eq!(legacy_i2c_index(0x58), Some(0));
        assert_eq!(legacy_i2c_index(0x5A), Some(1));
        assert_eq!(legacy_i2c_index(0xAA), Some(3));
        assert_eq!(legacy_i2c_index(0x99), None);
    }

    #[test]
    fn test_layout_for_version() {
        assert_eq!(
            ConfigLayout::for_version(BootloaderVersion::new(3, 4, 1)),
            ConfigLayout::Legacy
        );
        assert_eq!(
            ConfigLayout::for_version(BootloaderVersion::new(3, 4, 2)),
            ConfigLayout::Current
        );
        assert_eq!(ConfigLayout::Legacy.response_len(), 5);
        assert_eq!(ConfigLayout::Current.response_len(), 9);
    }

    #[test]
    fn test_decode_legacy_word() {
        // check on, pin 3, polarity 1, port 2, uart+i2c, addr index 1,
        // timeout 2^10, exit mode timeout, crc check
        let word: u64 = 1 | 3 << 1 | 1 << 5 | 2 << 6 | 1 << 8 | 1 << 9 | 1 << 11 | 10 << 16 | 1 << 20 | 1 << 24;
        let cfg = BootloaderConfig::from_word(ConfigLayout::Legacy, word);

        assert!(cfg.enter_bl_check);
        assert_eq!(cfg.ebl_pin, 3);
        assert_eq!(cfg.ebl_polarity, 1);
        assert_eq!(cfg.ebl_port, 2);
        assert!(cfg.uart_enable);
        assert!(cfg.i2c_enable);
        assert!(!cfg.spi_enable);
        assert_eq!(cfg.i2c_addr, 0x5A);
        assert_eq!(cfg.exit_timeout_ms(), 1024);
        assert_eq!(cfg.exit_mode, ExitMode::Timeout);
        assert!(cfg.crc_check);
        assert!(!cfg.valid_mark_check);
        assert!(!cfg.lock_swd);
        assert_eq!(cfg.to_word().unwrap(), word);
    }

    #[test]
    fn test_decode_current_word() {
        let word: u64 = 2 << 5 | 1 << 10 | 2 << 20 | 1 << 25 | 1 << 26 | 0x55 << 32;
        let cfg = BootloaderConfig::from_word(ConfigLayout::Current, word);

        assert!(!cfg.enter_bl_check);
        assert_eq!(cfg.ebl_polarity, 2);
        assert_eq!(cfg.ebl_port, 0);
        assert!(cfg.spi_enable);
        assert_eq!(cfg.i2c_addr, 0x55);
        assert_eq!(cfg.exit_mode, ExitMode::Indefinite);
        assert!(cfg.valid_mark_check);
        assert!(cfg.lock_swd);
        assert_eq!(cfg.exit_timeout_ms(), 1);
        assert_eq!(cfg.to_word().unwrap(), word);
    }

    #[test]
    fn test_from_response_big_endian() {
        let rsp = [0xAA, 0x00, 0x00, 0x01, 0x01];
        let cfg = BootloaderConfig::from_response(ConfigLayout::Legacy, &rsp).unwrap();
        assert!(cfg.enter_bl_check);
        assert!(cfg.uart_enable);

        let rsp = [0xAA, 0x00, 0x00, 0x00, 0x5C, 0x00, 0x00, 0x00, 0x00];
        let cfg = BootloaderConfig::from_response(ConfigLayout::Current, &rsp).unwrap();
        assert_eq!(cfg.i2c_addr, 0x5C);

        assert!(BootloaderConfig::from_response(ConfigLayout::Current, &rsp[..5]).is_err());
    }

    #[test]
    fn test_legacy_encode_rejects_unlisted_address() {
        let mut cfg = BootloaderConfig::from_word(ConfigLayout::Legacy, 0);
        cfg.i2c_addr = 0x55;
        assert!(cfg.to_word().is_err());
    }
}
