//! Maxim bootloader protocol engine.
//!
//! [`Bootloader`] owns the transport and the bridge settings for one target.
//! Every command is a self-contained exchange built on
//! [`Bootloader::send_receive`]:
//!
//! ```text
//!   open transport
//!       |
//!       v
//!   write phase   UART: raw bytes, once
//!       |         I2C/SPI: bus write frame, up to 2 attempts until the
//!       |                  bridge reports the full length accepted
//!       v
//!   read phase    up to delay/step + 1 attempts, pausing `step` before
//!       |         each when a delay is configured; accept a full-length
//!       |         response whose first byte is not "try again"
//!       v
//!   close transport (always)
//! ```
//!
//! State flows `Idle -> BootloaderMode -> (ConfigExchange | FlashSequence)
//! -> Idle`; the engine itself only remembers what it discovered about the
//! target (part and version).

pub mod config;
pub mod version;

pub use config::{BootloaderConfig, ConfigItem, ConfigLayout, ExitMode, LEGACY_I2C_ADDRS};
pub use version::BootloaderVersion;

use {
    crate::{
        connection::{Transport, format_hex},
        error::{Error, Result},
        protocol::{
            bridge::{Bridge, bus_read_frame, bus_write_frame},
            command::{Command, MODE_APPLICATION, MODE_BOOTLOADER, Status},
        },
        settings::{BridgeSettings, GpioPin},
        target::TargetPart,
    },
    byteorder::{BigEndian, ByteOrder},
    log::{debug, info, trace, warn},
    std::time::Duration,
};

/// Write attempts in bridged (I2C/SPI) modes.
const MAX_WRITE_ATTEMPTS: usize = 2;

/// Pause between bridged write attempts.
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bridged writes above this size need time before the bridge answers.
const LARGE_WRITE_THRESHOLD: usize = 1024;

/// Settle time for large bridged writes.
const LARGE_WRITE_SETTLE: Duration = Duration::from_millis(300);

/// Lengths accepted for AES keys and AAD.
const AES_LENGTHS: [usize; 3] = [16, 24, 32];

/// Size of each padded key/AAD slot in `SET_KEY_AAD`.
const AES_SLOT: usize = 32;

/// IV (nonce) length.
pub const IV_LEN: usize = 11;

/// Authentication tag length.
pub const AUTH_LEN: usize = 16;

/// USN length.
pub const USN_LEN: usize = 24;

/// Largest exit-timeout exponent that fits the 4-bit field.
const MAX_TIMEOUT_EXPONENT: u8 = 15;

/// Read-phase polling policy for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polling {
    /// Total time the target may need.
    pub delay: Duration,
    /// Pause before each read attempt when `delay` is non-zero.
    pub step: Duration,
}

impl Polling {
    /// Single read, no pause.
    pub const IMMEDIATE: Self = Self::from_millis(0, 100);
    /// `ERASE_APP`.
    pub const ERASE_APP: Self = Self::from_millis(2000, 1000);
    /// `WRITE_PAGE`.
    pub const WRITE_PAGE: Self = Self::from_millis(1000, 100);
    /// `SET_KEY_AAD`.
    pub const LOAD_KEY: Self = Self::from_millis(2000, 500);
    /// `SAVE_SETTINGS`.
    pub const SAVE_SETTINGS: Self = Self::from_millis(1000, 500);

    /// Build a policy from milliseconds.
    pub const fn from_millis(delay_ms: u64, step_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            step: Duration::from_millis(step_ms),
        }
    }

    /// Number of read attempts: `delay / step + 1`.
    pub fn attempts(self) -> u128 {
        let step = self
            .step
            .as_millis();
        if step == 0 {
            return 1;
        }
        self.delay
            .as_millis()
            / step
            + 1
    }
}

#[cfg(not(test))]
fn pause(duration: Duration) {
    std::thread::sleep(duration);
}

#[cfg(test)]
fn pause(_duration: Duration) {}

/// Encode an exit timeout as the exponent the bootloader stores.
///
/// The bootloader keeps `round(log2(ms))`, so anything that is not a power of
/// two is rounded to the nearest one (1000 ms becomes 1024 ms).
pub fn encode_exit_timeout(ms: u32) -> Result<u8> {
    if ms == 0 {
        return Err(Error::InvalidArgument("exit timeout must be at least 1 ms".into()));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // log2 of a u32 is < 33
    let exponent = f64::from(ms)
        .log2()
        .round() as u8;
    if exponent > MAX_TIMEOUT_EXPONENT {
        return Err(Error::InvalidArgument(format!(
            "exit timeout {ms} ms exceeds {} ms",
            1u32 << MAX_TIMEOUT_EXPONENT
        )));
    }
    Ok(exponent)
}

/// Bootloader session for one target.
pub struct Bootloader<T: Transport> {
    transport: T,
    settings: BridgeSettings,
    part: Option<TargetPart>,
    version: Option<BootloaderVersion>,
}

impl<T: Transport> Bootloader<T> {
    /// Create a session over `transport`.
    pub fn new(transport: T, settings: BridgeSettings) -> Self {
        Self {
            transport,
            settings,
            part: None,
            version: None,
        }
    }

    /// Session settings.
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Mutable session settings.
    pub fn settings_mut(&mut self) -> &mut BridgeSettings {
        &mut self.settings
    }

    /// Part discovered by [`Self::get_target_type`].
    pub fn part(&self) -> Option<TargetPart> {
        self.part
    }

    /// Version discovered by [`Self::get_target_version`].
    pub fn version(&self) -> Option<BootloaderVersion> {
        self.version
    }

    /// Bridge adapter commands over this session's transport.
    pub fn bridge(&mut self) -> Bridge<'_, T> {
        Bridge::new(&mut self.transport)
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ---- Exchange ----

    /// Send `cmd` and wait for a `rx_len`-byte response.
    ///
    /// The transport is closed on return whatever the outcome.
    pub fn send_receive(&mut self, cmd: &[u8], rx_len: usize, polling: Polling) -> Result<Vec<u8>> {
        self.transport
            .open()?;
        let result = self.exchange(cmd, rx_len, polling);
        self.transport
            .close_quietly();
        result
    }

    fn exchange(&mut self, cmd: &[u8], rx_len: usize, polling: Polling) -> Result<Vec<u8>> {
        trace!("BL TX [{}], expecting {rx_len} bytes", format_hex(cmd));
        let bridged = !self
            .settings
            .mode
            .is_uart();

        if bridged {
            self.bridged_write(cmd)?;
        } else {
            let written = self
                .transport
                .write(cmd)?;
            self.transport
                .flush()?;
            if written != cmd.len() {
                return Err(Error::WriteIncomplete {
                    expected: cmd.len(),
                    written: i64::try_from(written).unwrap_or(i64::MAX),
                });
            }
        }

        let attempts = polling.attempts();
        let mut last = Vec::new();
        for attempt in 1..=attempts {
            if !polling
                .delay
                .is_zero()
            {
                pause(polling.step);
            }

            last = if bridged {
                self.bridged_read(rx_len)?
            } else {
                let timeout = self
                    .transport
                    .timeout();
                self.transport
                    .read(rx_len, timeout)?
            };

            let busy = last.first() == Some(&Status::TryAgain.code());
            if last.len() == rx_len && !busy {
                trace!("BL RX [{}]", format_hex(&last));
                return Ok(last);
            }
            debug!(
                "Read attempt {attempt}/{attempts}: {} of {rx_len} bytes{}",
                last.len(),
                if busy { ", target busy" } else { "" }
            );
        }

        if last.len() == rx_len {
            Err(Error::Timeout(format!(
                "target still busy after {attempts} read attempts"
            )))
        } else {
            Err(Error::ShortResponse {
                expected: rx_len,
                actual: last.len(),
            })
        }
    }

    fn bridged_write(&mut self, cmd: &[u8]) -> Result<()> {
        let frame = bus_write_frame(self.settings.i2c_addr, cmd)?;
        let expected = i64::try_from(cmd.len()).unwrap_or(i64::MAX);
        let mut reported = 0i64;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            self.transport
                .write_packet(&frame)?;
            if cmd.len() > LARGE_WRITE_THRESHOLD {
                pause(LARGE_WRITE_SETTLE);
            }
            reported = i64::from(
                self.transport
                    .read_packet()?
                    .status,
            );
            if reported == expected {
                return Ok(());
            }
            warn!(
                "Write attempt {attempt}/{MAX_WRITE_ATTEMPTS}: bridge accepted {reported} of {expected} bytes"
            );
            if attempt < MAX_WRITE_ATTEMPTS {
                pause(WRITE_RETRY_DELAY);
            }
        }

        Err(Error::WriteIncomplete {
            expected: cmd.len(),
            written: reported,
        })
    }

    fn bridged_read(&mut self, rx_len: usize) -> Result<Vec<u8>> {
        let len = u16::try_from(rx_len)
            .map_err(|_| Error::InvalidArgument(format!("response length {rx_len} too large")))?;
        self.transport
            .write_packet(&bus_read_frame(self.settings.i2c_addr, len))?;
        let packet = self
            .transport
            .read_packet()?;
        // A genuine one-byte 0xFF reply looks the same as no data and is retried.
        if packet.is_empty() || usize::try_from(packet.status).ok() != Some(rx_len) {
            return Ok(Vec::new());
        }
        Ok(packet.payload)
    }

    /// Send a command and require the bootloader success status.
    fn command(&mut self, cmd: &[u8], rx_len: usize, polling: Polling) -> Result<Vec<u8>> {
        let rsp = self.send_receive(cmd, rx_len, polling)?;
        let status = Status::from(rsp[0]);
        if status != Status::BootloaderSuccess {
            debug!("Command {:02X} {:02X} failed: {status}", cmd[0], cmd[1]);
            return Err(Error::Device { status });
        }
        Ok(rsp)
    }

    // ---- Mode ----

    /// Put the target into bootloader mode, escalating to MFIO if needed.
    ///
    /// The first attempt pulses reset and sends `SET_MODE`. If that fails the
    /// reset is pulsed again with MFIO asserted; MFIO is released afterwards
    /// whatever the outcome. GPIO failures are logged and do not abort.
    pub fn enter_bootloader_mode(&mut self) -> Result<()> {
        self.pulse_reset();
        match self.enter_bootloader() {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Bootloader entry failed ({e}), retrying with MFIO asserted"),
        }

        self.pulse_reset();
        let mfio = self
            .settings
            .mfio_pin;
        let asserted = self
            .settings
            .mfio_polarity;
        self.set_gpio_logged(mfio, asserted);
        let result = self.enter_bootloader();
        self.set_gpio_logged(mfio, !asserted);
        result
    }

    fn pulse_reset(&mut self) {
        let reset = self
            .settings
            .reset_pin;
        self.set_gpio_logged(reset, false);
        self.set_gpio_logged(reset, true);
    }

    fn set_gpio_logged(&mut self, pin: GpioPin, high: bool) {
        if let Err(e) = self
            .bridge()
            .gpio_set(pin, high)
        {
            warn!("Failed to drive bridge {pin}: {e}");
        }
    }

    /// Send `SET_MODE` (enter bootloader).
    pub fn enter_bootloader(&mut self) -> Result<()> {
        self.command(&Command::SetMode.with_args(&[MODE_BOOTLOADER]), 1, Polling::IMMEDIATE)?;
        info!("Target in bootloader mode");
        Ok(())
    }

    /// Send `SET_MODE` (exit to application).
    pub fn exit_bootloader(&mut self) -> Result<()> {
        self.command(&Command::SetMode.with_args(&[MODE_APPLICATION]), 1, Polling::IMMEDIATE)?;
        info!("Target left bootloader mode");
        Ok(())
    }

    // ---- Identity ----

    /// Query the part. The result is remembered on the session.
    pub fn get_target_type(&mut self) -> Result<TargetPart> {
        let rsp = self.command(&Command::GetPlatformType.with_args(&[]), 2, Polling::IMMEDIATE)?;
        let part = TargetPart::from_platform_id(rsp[1]);
        debug!("Target part: {part}");
        self.part = Some(part);
        Ok(part)
    }

    /// Query the bootloader version. The result is remembered on the session.
    pub fn get_target_version(&mut self) -> Result<BootloaderVersion> {
        let rsp = self.command(&Command::GetVersion.with_args(&[]), 4, Polling::IMMEDIATE)?;
        let version = BootloaderVersion::new(rsp[1], rsp[2], rsp[3]);
        debug!("Bootloader version: {version}");
        self.version = Some(version);
        Ok(version)
    }

    fn known_version(&mut self) -> Result<BootloaderVersion> {
        match self.version {
            Some(version) => Ok(version),
            None => self.get_target_version(),
        }
    }

    /// Query the flash page size in bytes.
    pub fn get_page_size(&mut self) -> Result<u16> {
        let rsp = self.command(&Command::GetPageSize.with_args(&[]), 3, Polling::IMMEDIATE)?;
        Ok(BigEndian::read_u16(&rsp[1..3]))
    }

    /// Query the 24-byte unique serial number.
    pub fn get_usn(&mut self) -> Result<Vec<u8>> {
        let rsp = self.command(&Command::GetUsn.with_args(&[]), USN_LEN + 1, Polling::IMMEDIATE)?;
        Ok(rsp[1..].to_vec())
    }

    // ---- Flash sequence ----

    /// Announce the number of pages about to be written.
    pub fn set_num_pages(&mut self, pages: u16) -> Result<()> {
        self.command(&Command::SetNumPages.with_args(&pages.to_be_bytes()), 1, Polling::IMMEDIATE)?;
        Ok(())
    }

    /// Load the 11-byte nonce.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<()> {
        if iv.len() != IV_LEN {
            return Err(Error::InvalidArgument(format!(
                "IV must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        self.command(&Command::SetIv.with_args(iv), 1, Polling::IMMEDIATE)?;
        Ok(())
    }

    /// Load the 16-byte authentication tag.
    pub fn set_auth_bytes(&mut self, auth: &[u8]) -> Result<()> {
        if auth.len() != AUTH_LEN {
            return Err(Error::InvalidArgument(format!(
                "auth tag must be {AUTH_LEN} bytes, got {}",
                auth.len()
            )));
        }
        self.command(&Command::SetAuth.with_args(auth), 1, Polling::IMMEDIATE)?;
        Ok(())
    }

    /// Erase the application area.
    pub fn erase_app(&mut self) -> Result<()> {
        info!("Erasing application");
        self.command(&Command::EraseApp.with_args(&[]), 1, Polling::ERASE_APP)?;
        Ok(())
    }

    /// Write one page (payload followed by its checksum).
    pub fn write_page(&mut self, page: &[u8]) -> Result<()> {
        self.command(&Command::WritePage.with_args(page), 1, Polling::WRITE_PAGE)?;
        Ok(())
    }

    /// Load an AES key and its additional authenticated data.
    ///
    /// Both must be 16, 24 or 32 bytes; each is sent as a length byte and a
    /// zero-padded 32-byte slot.
    pub fn load_aes_key(&mut self, key: &[u8], aad: &[u8]) -> Result<()> {
        for (name, value) in [("key", key), ("AAD", aad)] {
            if !AES_LENGTHS.contains(&value.len()) {
                return Err(Error::InvalidArgument(format!(
                    "wrong {name} length {}, expected 16, 24 or 32",
                    value.len()
                )));
            }
        }

        let mut args = Vec::with_capacity(2 * (AES_SLOT + 1));
        for value in [key, aad] {
            #[allow(clippy::cast_possible_truncation)] // length checked above
            let len = value.len() as u8;
            args.push(len);
            args.extend_from_slice(value);
            args.resize(args.len() + AES_SLOT - value.len(), 0);
        }

        self.command(&Command::SetKeyAad.with_args(&args), 1, Polling::LOAD_KEY)?;
        info!("AES key loaded");
        Ok(())
    }

    // ---- Configuration ----

    /// Read the configuration word using the layout of `version`.
    pub fn get_bootloader_config(&mut self, version: BootloaderVersion) -> Result<BootloaderConfig> {
        let layout = ConfigLayout::for_version(version);
        let rsp = self.command(
            &Command::ReadAllConfig.with_args(&[0x00]),
            layout.response_len(),
            Polling::IMMEDIATE,
        )?;
        BootloaderConfig::from_response(layout, &rsp)
    }

    /// Read the configuration word, querying the version first if unknown.
    pub fn read_config(&mut self) -> Result<BootloaderConfig> {
        let version = self.known_version()?;
        self.get_bootloader_config(version)
    }

    /// Update one configuration item.
    pub fn update_config_item(&mut self, item: ConfigItem, value: u8) -> Result<()> {
        debug!("Config item {item:?} <- {value:#04X}");
        self.command(
            &Command::EntryConfig.with_args(&[item as u8, value]),
            1,
            Polling::IMMEDIATE,
        )?;
        Ok(())
    }

    /// Enable or disable the EBL pin check at boot.
    pub fn set_enter_bl_check(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::EnterBlCheck, u8::from(enabled))
    }

    /// Select the EBL pin.
    pub fn set_ebl_pin(&mut self, port: u8, pin: u8) -> Result<()> {
        if port > 0x03 || pin > 0x3F {
            return Err(Error::InvalidArgument(format!("EBL pin P{port}.{pin} out of range")));
        }
        self.update_config_item(ConfigItem::EblPin, (port << 6) | pin)
    }

    /// Set the EBL active level.
    pub fn set_ebl_polarity(&mut self, active_high: bool) -> Result<()> {
        self.update_config_item(ConfigItem::EblPolarity, u8::from(active_high))
    }

    /// Enable or disable the valid-mark check.
    pub fn set_valid_mark_check(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::ValidMarkCheck, u8::from(enabled))
    }

    /// Enable or disable the UART interface.
    pub fn set_uart_enable(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::UartEnable, u8::from(enabled))
    }

    /// Enable or disable the I2C interface.
    pub fn set_i2c_enable(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::I2cEnable, u8::from(enabled))
    }

    /// Enable or disable the SPI interface.
    pub fn set_spi_enable(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::SpiEnable, u8::from(enabled))
    }

    /// Enable or disable the application CRC check.
    pub fn set_crc_check(&mut self, enabled: bool) -> Result<()> {
        self.update_config_item(ConfigItem::CrcCheck, u8::from(enabled))
    }

    /// Lock or unlock the SWD port.
    pub fn set_swd_lock(&mut self, locked: bool) -> Result<()> {
        self.update_config_item(ConfigItem::LockSwd, u8::from(locked))
    }

    /// Set the bootloader's I2C address.
    ///
    /// Legacy bootloaders only accept the addresses in
    /// [`LEGACY_I2C_ADDRS`], sent as their index; anything else is rejected
    /// without contacting the target.
    pub fn set_i2c_address(&mut self, addr: u8) -> Result<()> {
        let version = self.known_version()?;
        let value = if version.is_legacy() {
            config::legacy_i2c_index(addr).ok_or(Error::UnsupportedI2cAddress {
                addr,
                version: version.to_string(),
            })?
        } else if addr > 0x7F {
            return Err(Error::InvalidArgument(format!(
                "I2C address {addr:#04X} is not a 7-bit address"
            )));
        } else {
            addr
        };
        self.update_config_item(ConfigItem::I2cAddr, value)
    }

    /// Set the exit behaviour.
    pub fn set_exit_mode(&mut self, mode: ExitMode) -> Result<()> {
        self.command(
            &Command::ExitConfig.with_args(&[0x00, mode.code()]),
            1,
            Polling::IMMEDIATE,
        )?;
        Ok(())
    }

    /// Set the exit timeout in milliseconds (stored as a power of two).
    pub fn set_exit_timeout(&mut self, ms: u32) -> Result<()> {
        let exponent = encode_exit_timeout(ms)?;
        if 1u32 << exponent != ms {
            debug!("Exit timeout {ms} ms stored as {} ms", 1u32 << exponent);
        }
        self.command(
            &Command::ExitConfig.with_args(&[0x01, exponent]),
            1,
            Polling::IMMEDIATE,
        )?;
        Ok(())
    }

    /// Persist the configuration to flash.
    pub fn flash_config(&mut self) -> Result<()> {
        self.command(&Command::SaveSettings.with_args(&[]), 1, Polling::SAVE_SETTINGS)?;
        info!("Bootloader configuration saved");
        Ok(())
    }

    /// Apply every field of `config` and save it, stopping at the first
    /// failure.
    ///
    /// `lock_swd` is not applied; use [`Self::set_swd_lock`] explicitly.
    pub fn write_config(&mut self, config: &BootloaderConfig) -> Result<()> {
        self.set_enter_bl_check(config.enter_bl_check)?;
        self.set_ebl_pin(config.ebl_port, config.ebl_pin)?;
        self.set_ebl_polarity(config.ebl_polarity == 1)?;
        self.set_i2c_address(config.i2c_addr)?;
        self.set_valid_mark_check(config.valid_mark_check)?;
        self.set_crc_check(config.crc_check)?;
        self.set_uart_enable(config.uart_enable)?;
        self.set_i2c_enable(config.i2c_enable)?;
        self.set_spi_enable(config.spi_enable)?;
        self.set_exit_mode(config.exit_mode)?;
        self.set_exit_timeout(config.exit_timeout_ms())?;
        self.flash_config()
    }
}
