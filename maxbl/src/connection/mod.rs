//! Transport sessions.
//!
//! A [`Transport`] is the duplex byte channel the bridge and bootloader talk
//! through. Every exchange opens it, does its work and closes it again, so
//! `open` and `close` must be idempotent.
//!
//! ## Bridge response packet
//!
//! ```text
//! +----------+----------------+-------------------+
//! |  Length  |     Status     |      Payload      |
//! +----------+----------------+-------------------+
//! | u16 (BE) |   i32 (BE)     |  length - 4 bytes |
//! +----------+----------------+-------------------+
//! ```

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "native")]
pub mod serial;

#[cfg(feature = "native")]
pub use serial::SerialTransport;

use {
    crate::error::{Error, Result, STATUS_UNKNOWN},
    byteorder::{BigEndian, ByteOrder},
    log::{trace, warn},
    std::{fmt::Write as _, time::Duration},
};

/// Payload byte used when a packet carried no data.
pub const NO_DATA: u8 = 0xFF;

/// Decoded bridge response packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Signed status word. `0xFF` when the packet was incomplete.
    pub status: i32,
    /// Payload following the status word. Never empty.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, substituting `[0xFF]` for an empty payload.
    pub fn new(status: i32, payload: Vec<u8>) -> Self {
        let payload = if payload.is_empty() {
            vec![NO_DATA]
        } else {
            payload
        };
        Self { status, payload }
    }

    /// The "nothing received" packet.
    pub fn unknown() -> Self {
        Self::new(STATUS_UNKNOWN, Vec::new())
    }

    /// Whether the payload is the single-byte "no data" marker.
    pub fn is_empty(&self) -> bool {
        self.payload == [NO_DATA]
    }
}

/// Duplex byte channel to the target or the bridge adapter.
pub trait Transport {
    /// Open the underlying device. Opening an open transport is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Release the underlying device. Closing a closed transport is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// Default read timeout used by [`Transport::read_packet`].
    fn timeout(&self) -> Duration;

    /// Write raw bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending output.
    fn flush(&mut self) -> Result<()>;

    /// Read up to `max_len` bytes.
    ///
    /// Returns fewer bytes (possibly none) when `timeout` elapses first.
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Write a complete packet and flush it.
    fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        trace!("TX [{}]", format_hex(data));
        let written = self.write(data)?;
        if written != data.len() {
            return Err(Error::WriteIncomplete {
                expected: data.len(),
                written: i64::try_from(written).unwrap_or(i64::MAX),
            });
        }
        self.flush()
    }

    /// Read one length-prefixed response packet.
    ///
    /// A missing prefix, a truncated body or a body shorter than the status
    /// word yields [`Packet::unknown`].
    fn read_packet(&mut self) -> Result<Packet> {
        let timeout = self.timeout();

        let prefix = self.read(2, timeout)?;
        if prefix.len() < 2 {
            trace!("RX packet: no length prefix");
            return Ok(Packet::unknown());
        }
        let len = usize::from(BigEndian::read_u16(&prefix));

        let body = self.read(len, timeout)?;
        trace!("RX len={len} [{}]", format_hex(&body));
        if body.len() < len || len < 4 {
            return Ok(Packet::unknown());
        }

        let status = BigEndian::read_i32(&body[..4]);
        Ok(Packet::new(status, body[4..].to_vec()))
    }

    /// Close, logging instead of returning a failure.
    fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close transport: {e}");
        }
    }
}

/// Format bytes as space-separated upper-case hex.
pub fn format_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data
        .iter()
        .enumerate()
    {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn test_read_packet_splits_status_and_payload() {
        let mut t = MockTransport::new();
        t.push_response(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0xAA, 0xBB]);
        t.open()
            .unwrap();

        let packet = t
            .read_packet()
            .unwrap();
        assert_eq!(packet.status, 0);
        assert_eq!(packet.payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_read_packet_truncated_body() {
        let mut t = MockTransport::new();
        t.push_response(&[0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0xAA]);
        t.open()
            .unwrap();

        let packet = t
            .read_packet()
            .unwrap();
        assert_eq!(packet, Packet::unknown());
        assert!(packet.is_empty());
    }

    #[test]
    fn test_read_packet_without_prefix() {
        let mut t = MockTransport::new();
        t.open()
            .unwrap();
        assert_eq!(
            t.read_packet()
                .unwrap(),
            Packet::new(0xFF, vec![0xFF])
        );
    }

    #[test]
    fn test_read_packet_status_only() {
        let mut t = MockTransport::new();
        t.push_response(&[0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFE]);
        t.open()
            .unwrap();

        let packet = t
            .read_packet()
            .unwrap();
        assert_eq!(packet.status, -2);
        assert_eq!(packet.payload, vec![NO_DATA]);
    }

    #[test]
    fn test_write_packet_flushes() {
        let mut t = MockTransport::new();
        t.open()
            .unwrap();
        t.write_packet(&[1, 2, 3])
            .unwrap();
        assert_eq!(t.writes(), &[vec![1, 2, 3]]);
        assert_eq!(t.flushes, 1);
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xDE, 0x0F, 0x00]), "DE 0F 00");
        assert_eq!(format_hex(&[]), "");
    }
}
