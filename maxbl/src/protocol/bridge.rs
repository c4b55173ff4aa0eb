//! Bridge adapter protocol.
//!
//! The bridge is a USB-serial adapter that forwards bootloader traffic to the
//! target over I2C, SPI or UART and exposes two GPIOs wired to the target's
//! reset and MFIO lines.
//!
//! ## Bridge command frame
//!
//! ```text
//! +-------------------------+--------+-------------------+
//! |          Magic          | Length |      Payload      |
//! +-------------------------+--------+-------------------+
//! | DE EF AA 55 23 41 16 DC |   u8   |   length bytes    |
//! +-------------------------+--------+-------------------+
//! ```
//!
//! The bridge answers with a length-prefixed packet (see
//! [`Transport::read_packet`]); a zero status means success.
//!
//! ## Bus frames
//!
//! In I2C/SPI mode, bootloader commands are sent unprefixed, wrapped in a
//! start/stop frame:
//!
//! ```text
//! +-----+-----------------+------------+------------+-----+
//! | 'S' | (addr << 1) | rw | Length BE  |  Command   | 'P' |
//! +-----+-----------------+------------+------------+-----+
//! ```
//!
//! A read frame carries no command bytes; its length is the number of bytes
//! to clock in.

use {
    crate::{
        connection::{Packet, Transport, format_hex},
        error::{Error, Result},
        settings::{BridgeMode, GpioPin},
    },
    log::{debug, info, trace},
};

/// Bridge command frame magic.
pub const BRIDGE_MAGIC: [u8; 8] = [0xDE, 0xEF, 0xAA, 0x55, 0x23, 0x41, 0x16, 0xDC];

/// Bus frame start byte.
pub const BUS_START: u8 = b'S';
/// Bus frame stop byte.
pub const BUS_STOP: u8 = b'P';

const BUS_WRITE: u8 = 0;
const BUS_READ: u8 = 1;

const CMD_SWITCH_MODE: u8 = b'B';
const CMD_GPIO: u8 = b'G';
const CMD_OTHER: u8 = b'O';

const GPIO_CONFIGURE: u8 = 0x00;
const GPIO_SET_CLR: u8 = 0x01;
const GPIO_GET: u8 = 0x02;

const PULLUP_DISABLE: u8 = 0x00;
const PULLUP_ENABLE: u8 = 0x01;

/// Build a magic-prefixed bridge command frame.
pub fn bridge_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u8::try_from(payload.len()).map_err(|_| {
        Error::InvalidArgument(format!("bridge payload too long: {} bytes", payload.len()))
    })?;
    let mut frame = Vec::with_capacity(BRIDGE_MAGIC.len() + 1 + payload.len());
    frame.extend_from_slice(&BRIDGE_MAGIC);
    frame.push(len);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Wrap a bootloader command in a bus write frame.
pub fn bus_write_frame(i2c_addr: u8, cmd: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(cmd.len())
        .map_err(|_| Error::InvalidArgument(format!("command too long: {} bytes", cmd.len())))?;
    let mut frame = Vec::with_capacity(cmd.len() + 5);
    frame.push(BUS_START);
    frame.push((i2c_addr << 1) | BUS_WRITE);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(cmd);
    frame.push(BUS_STOP);
    Ok(frame)
}

/// Build a bus read frame requesting `len` bytes.
pub fn bus_read_frame(i2c_addr: u8, len: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5);
    frame.push(BUS_START);
    frame.push((i2c_addr << 1) | BUS_READ);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.push(BUS_STOP);
    frame
}

/// Bridge adapter commands over a borrowed transport.
///
/// Every call is a self-contained exchange: the transport is opened, the
/// frame sent, the response read and the transport closed again.
pub struct Bridge<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
}

impl<'a, T: Transport + ?Sized> Bridge<'a, T> {
    /// Borrow a transport for bridge commands.
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    fn exchange(&mut self, payload: &[u8]) -> Result<Packet> {
        let frame = bridge_frame(payload)?;
        self.transport
            .open()?;
        let result = self
            .transport
            .write_packet(&frame)
            .and_then(|()| {
                self.transport
                    .read_packet()
            });
        self.transport
            .close_quietly();

        let packet = result?;
        trace!("Bridge status {}, payload [{}]", packet.status, format_hex(&packet.payload));
        if packet.status != 0 {
            return Err(Error::Bridge {
                status: packet.status,
            });
        }
        Ok(packet)
    }

    /// Switch the bus the bridge forwards to.
    ///
    /// Returns the bridge's text reply.
    pub fn switch_mode(&mut self, mode: BridgeMode) -> Result<String> {
        let mut payload = vec![CMD_SWITCH_MODE];
        payload.extend_from_slice(
            mode.as_str()
                .as_bytes(),
        );
        let packet = self.exchange(&payload)?;
        let reply = if packet.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(&packet.payload)
                .trim_end_matches('\0')
                .trim()
                .to_string()
        };
        info!("Bridge switched to {mode}: {reply}");
        Ok(reply)
    }

    /// Configure the two GPIO modes (4 bits each).
    pub fn gpio_configure(&mut self, gpio0_mode: u8, gpio1_mode: u8) -> Result<()> {
        if gpio0_mode > 0x0F || gpio1_mode > 0x0F {
            return Err(Error::InvalidArgument(format!(
                "GPIO modes must fit in 4 bits (got {gpio0_mode}, {gpio1_mode})"
            )));
        }
        debug!("Configuring bridge GPIOs: gpio0={gpio0_mode}, gpio1={gpio1_mode}");
        self.exchange(&[CMD_GPIO, GPIO_CONFIGURE, (gpio1_mode << 4) | gpio0_mode])?;
        Ok(())
    }

    /// Drive one GPIO high or low.
    pub fn gpio_set(&mut self, pin: GpioPin, high: bool) -> Result<()> {
        let value = match (pin, high) {
            (GpioPin::Gpio0, true) => 0xF1,
            (GpioPin::Gpio0, false) => 0xF0,
            (GpioPin::Gpio1, true) => 0x1F,
            (GpioPin::Gpio1, false) => 0x0F,
        };
        debug!("Setting {pin} {}", if high { "high" } else { "low" });
        self.exchange(&[CMD_GPIO, GPIO_SET_CLR, value])?;
        Ok(())
    }

    /// Read both GPIO levels as `(gpio0, gpio1)`.
    pub fn gpio_get(&mut self) -> Result<(u8, u8)> {
        let packet = self.exchange(&[CMD_GPIO, GPIO_GET])?;
        if packet
            .payload
            .len()
            != 1
            || packet.is_empty()
        {
            return Err(Error::Protocol(format!(
                "invalid GPIO response [{}]",
                format_hex(&packet.payload)
            )));
        }
        let byte = packet.payload[0];
        Ok((byte & 0x0F, byte >> 4))
    }

    /// Enable or disable the bridge's on-board I2C pull-ups.
    pub fn set_onboard_pullup(&mut self, enabled: bool) -> Result<()> {
        let arg = if enabled {
            PULLUP_ENABLE
        } else {
            PULLUP_DISABLE
        };
        self.exchange(&[CMD_OTHER, arg])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockTransport;

    fn framed(payload: &[u8]) -> Vec<u8> {
        bridge_frame(payload).unwrap()
    }

    #[test]
    fn test_bridge_frame_layout() {
        let frame = framed(&[b'G', 0x02]);
        assert_eq!(&frame[..8], &BRIDGE_MAGIC);
        assert_eq!(frame[8], 2);
        assert_eq!(&frame[9..], &[b'G', 0x02]);
        assert!(bridge_frame(&[0u8; 256]).is_err());
    }

    #[test]
    fn test_bus_frames() {
        assert_eq!(
            bus_write_frame(0x55, &[0x01, 0x00, 0x08]).unwrap(),
            vec![b'S', 0xAA, 0x00, 0x03, 0x01, 0x00, 0x08, b'P']
        );
        assert_eq!(bus_read_frame(0x55, 9), vec![b'S', 0xAB, 0x00, 0x09, b'P']);
    }

    #[test]
    fn test_bus_frame_length_is_big_endian() {
        let frame = bus_write_frame(0x55, &[0u8; 0x0403]).unwrap();
        assert_eq!(&frame[..4], &[b'S', 0xAA, 0x04, 0x03]);
        assert_eq!(frame.len(), 0x0403 + 5);
        assert_eq!(bus_read_frame(0x55, 0x0102)[2..4], [0x01, 0x02]);
    }

    #[test]
    fn test_switch_mode() {
        let mut t = MockTransport::new();
        t.push_packet(0, b"I2C mode\0");
        let reply = Bridge::new(&mut t)
            .switch_mode(BridgeMode::I2c)
            .unwrap();
        assert_eq!(reply, "I2C mode");
        assert_eq!(t.writes(), &[framed(b"BI2C")]);
        assert_eq!(t.opens, 1);
        assert_eq!(t.closes, 1);
    }

    #[test]
    fn test_gpio_set_values() {
        let mut t = MockTransport::new();
        for _ in 0..4 {
            t.push_packet(0, &[]);
        }
        let mut bridge = Bridge::new(&mut t);
        bridge
            .gpio_set(GpioPin::Gpio0, true)
            .unwrap();
        bridge
            .gpio_set(GpioPin::Gpio0, false)
            .unwrap();
        bridge
            .gpio_set(GpioPin::Gpio1, true)
            .unwrap();
        bridge
            .gpio_set(GpioPin::Gpio1, false)
            .unwrap();

        let values: Vec<u8> = t
            .writes()
            .iter()
            .map(|w| w[11])
            .collect();
        assert_eq!(values, vec![0xF1, 0xF0, 0x1F, 0x0F]);
    }

    #[test]
    fn test_gpio_configure_packs_nibbles() {
        let mut t = MockTransport::new();
        t.push_packet(0, &[]);
        Bridge::new(&mut t)
            .gpio_configure(0x3, 0x5)
            .unwrap();
        assert_eq!(t.writes(), &[framed(&[b'G', 0x00, 0x53])]);
    }

    #[test]
    fn test_gpio_configure_rejects_wide_mode() {
        let mut t = MockTransport::new();
        assert!(
            Bridge::new(&mut t)
                .gpio_configure(0x10, 0)
                .is_err()
        );
        assert!(t.writes().is_empty());
        assert_eq!(t.opens, 0);
    }

    #[test]
    fn test_gpio_get_splits_nibbles() {
        let mut t = MockTransport::new();
        t.push_packet(0, &[0x10]);
        assert_eq!(
            Bridge::new(&mut t)
                .gpio_get()
                .unwrap(),
            (0, 1)
        );
    }

    #[test]
    fn test_pullup() {
        let mut t = MockTransport::new();
        t.push_packet(0, &[]);
        t.push_packet(0, &[]);
        let mut bridge = Bridge::new(&mut t);
        bridge
            .set_onboard_pullup(true)
            .unwrap();
        bridge
            .set_onboard_pullup(false)
            .unwrap();
        assert_eq!(t.writes()[0], framed(&[b'O', 0x01]));
        assert_eq!(t.writes()[1], framed(&[b'O', 0x00]));
    }

    #[test]
    fn test_nonzero_status_is_error_and_closes() {
        let mut t = MockTransport::new();
        t.push_packet(3, &[]);
        let err = Bridge::new(&mut t)
            .gpio_set(GpioPin::Gpio0, false)
            .unwrap_err();
        assert!(matches!(err, Error::Bridge { status: 3 }));
        assert!(!t.is_open());
    }

    #[test]
    fn test_silent_bridge_reports_unknown_status() {
        let mut t = MockTransport::new();
        let err = Bridge::new(&mut t)
            .gpio_get()
            .unwrap_err();
        assert!(matches!(err, Error::Bridge { status: 0xFF }));
    }
}
