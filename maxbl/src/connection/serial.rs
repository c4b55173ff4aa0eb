//! Serial port transport.

use {
    crate::{
        connection::Transport,
        error::Result,
        port::{NativePort, Port, SerialConfig},
    },
    log::debug,
    std::{
        io::{self, Read, Write},
        time::{Duration, Instant},
    },
};

/// Transport over a native serial port.
///
/// The port is opened on [`Transport::open`] and released on
/// [`Transport::close`], so the device is only held for the duration of one
/// exchange.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<NativePort>,
}

impl SerialTransport {
    /// Create a closed transport for the given port configuration.
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    /// Port configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> io::Result<&mut NativePort> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport not open"))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self
            .port
            .is_some()
        {
            return Ok(());
        }
        let mut port = NativePort::open(&self.config)?;
        port.clear_buffers()?;
        debug!("Opened {}", port.name());
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self
            .port
            .take()
        {
            port.close()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port
            .is_some()
    }

    fn timeout(&self) -> Duration {
        self.config
            .timeout
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.port()?
            .write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.port()?
            .flush()?;
        Ok(())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; max_len];
        let mut filled = 0;
        let port = self.port()?;

        while filled < max_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining)?;
            match port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close_quietly();
    }
}
