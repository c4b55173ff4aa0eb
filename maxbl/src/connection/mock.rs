//! Scripted in-memory transport for unit tests.

use {
    crate::{
        connection::Transport,
        error::{Error, Result},
    },
    byteorder::{BigEndian, WriteBytesExt},
    std::{collections::VecDeque, io, time::Duration},
};

/// Transport that replays queued responses and records everything written.
///
/// Each queued response is a separate chunk: a read never spans two chunks,
/// which mirrors a device answering one request at a time.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    /// `max_len` of every read call, in order.
    pub read_requests: Vec<usize>,
    pub flushes: usize,
    pub opens: usize,
    pub closes: usize,
    /// Fail every write with a broken pipe.
    pub fail_writes: bool,
    open: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes to be returned by subsequent reads.
    pub fn push_response(&mut self, data: &[u8]) {
        self.responses
            .push_back(data.to_vec());
    }

    /// Queue a length-prefixed bridge packet.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn push_packet(&mut self, status: i32, payload: &[u8]) {
        let mut data = Vec::with_capacity(payload.len() + 6);
        data.write_u16::<BigEndian>(u16::try_from(payload.len() + 4).unwrap())
            .unwrap();
        data.write_i32::<BigEndian>(status)
            .unwrap();
        data.extend_from_slice(payload);
        self.push_response(&data);
    }

    /// Everything written so far, one entry per write call.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.responses
            .len()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        if !self.open {
            self.opens += 1;
            self.open = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.closes += 1;
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(Error::Io(io::Error::new(io::ErrorKind::NotConnected, "closed")));
        }
        if self.fail_writes {
            return Err(Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        }
        self.writes
            .push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn read(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        if !self.open {
            return Err(Error::Io(io::Error::new(io::ErrorKind::NotConnected, "closed")));
        }
        self.read_requests
            .push(max_len);

        let Some(mut chunk) = self
            .responses
            .pop_front()
        else {
            return Ok(Vec::new());
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            self.responses
                .push_front(rest);
        }
        Ok(chunk)
    }
}
