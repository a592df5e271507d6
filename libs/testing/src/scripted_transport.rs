use std::collections::VecDeque;
use std::io;
use std::thread;
use std::time::Duration;

use log::debug;

use roadlink_core::Transport;

use crate::errors::ScriptError;

const IDLE_PAUSE: Duration = Duration::from_millis(2);

/// What a [`ScriptedTransport`] does after a scripted request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reply {
    /// Makes these bytes available to read.
    Bytes(Vec<u8>),

    /// Answers nothing, so the caller times out.
    Silence,

    /// Fails the next read with this kind of error.
    Error(io::ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Step {
    expect: Option<Vec<u8>>,
    reply: Reply,
}

/// A mock [`Transport`] that plays back a fixed conversation.
///
/// Each step names the exact request expected and the reply to give. A request that doesn't
/// match the script fails the write with [`io::ErrorKind::InvalidData`]; call
/// [`finish`](Self::finish) at the end of a test to check that every step was used.
///
/// # Examples
///
/// ```
/// use roadlink_core::{g4, DropAddress, ErrorClass};
/// use roadlink_testing::ScriptedTransport;
///
/// let request = g4::G4Frame::data_request(DropAddress(7)).to_bytes();
/// let mut transport = ScriptedTransport::new().expect_silence(request);
/// let error = g4::query_stats(&mut transport, DropAddress(7)).unwrap_err();
/// assert_eq!(ErrorClass::Timeout, error.class());
/// transport.finish().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    pending: VecDeque<u8>,
    pending_error: Option<io::ErrorKind>,
    chunk_size: usize,
    timeout: Duration,
    written: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    /// Creates an empty script with a 50 ms timeout.
    pub fn new() -> Self {
        ScriptedTransport {
            steps: VecDeque::new(),
            pending: VecDeque::new(),
            pending_error: None,
            chunk_size: usize::MAX,
            timeout: Duration::from_millis(50),
            written: Vec::new(),
        }
    }

    /// Expects `request` and answers `response`.
    pub fn expect<R: Into<Vec<u8>>, S: Into<Vec<u8>>>(self, request: R, response: S) -> Self {
        self.step(Some(request.into()), Reply::Bytes(response.into()))
    }

    /// Expects `request` and answers nothing.
    pub fn expect_silence<R: Into<Vec<u8>>>(self, request: R) -> Self {
        self.step(Some(request.into()), Reply::Silence)
    }

    /// Expects `request` and fails the next read with `kind`.
    pub fn expect_error<R: Into<Vec<u8>>>(self, request: R, kind: io::ErrorKind) -> Self {
        self.step(Some(request.into()), Reply::Error(kind))
    }

    /// Makes `bytes` available once everything before it has been read, without a request.
    pub fn unsolicited<S: Into<Vec<u8>>>(self, bytes: S) -> Self {
        self.step(None, Reply::Bytes(bytes.into()))
    }

    /// Limits how many bytes a single read returns.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the response timeout reported to protocol code.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn step(mut self, expect: Option<Vec<u8>>, reply: Reply) -> Self {
        self.steps.push_back(Step { expect, reply });
        self
    }

    fn play(&mut self, reply: Reply) {
        match reply {
            Reply::Bytes(bytes) => self.pending.extend(bytes),
            Reply::Silence => {}
            Reply::Error(kind) => self.pending_error = Some(kind),
        }
    }

    /// Requests written so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Checks that every step of the script was played.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Unfinished`] if steps remain.
    pub fn finish(&self) -> Result<(), ScriptError> {
        if self.steps.is_empty() {
            Ok(())
        } else {
            Err(ScriptError::Unfinished {
                remaining: self.steps.len(),
            })
        }
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        debug!("Script request: {:02X?}", bytes);
        self.written.push(bytes.to_vec());
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None => return Err(ScriptError::Exhausted { actual: bytes.to_vec() }.into()),
        };
        match step.expect {
            Some(ref expected) if expected.as_slice() == bytes => {
                self.play(step.reply);
                Ok(())
            }
            Some(expected) => Err(ScriptError::Unexpected {
                expected,
                actual: bytes.to_vec(),
            }
            .into()),
            None => {
                let error = ScriptError::Unexpected {
                    expected: Vec::new(),
                    actual: bytes.to_vec(),
                };
                self.steps.push_front(step);
                Err(error.into())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.pending_error.take() {
            return Err(io::Error::new(kind, "Scripted failure"));
        }
        if self.pending.is_empty() && matches!(self.steps.front(), Some(Step { expect: None, .. })) {
            if let Some(step) = self.steps.pop_front() {
                self.play(step.reply);
            }
        }
        if self.pending.is_empty() {
            thread::sleep(IDLE_PAUSE);
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "No data"));
        }
        let n = buf.len().min(self.chunk_size).min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_back_in_chunks() {
        let mut transport = ScriptedTransport::new().expect("ping", "pong").with_chunk_size(3);
        transport.write_all(b"ping").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(3, transport.read(&mut buf).unwrap());
        assert_eq!(1, transport.read(&mut buf).unwrap());
        assert_eq!(b'g', buf[0]);
        transport.finish().unwrap();
    }

    #[test]
    fn unexpected_request_fails_write() {
        let mut transport = ScriptedTransport::new().expect("ping", "pong");
        let error = transport.write_all(b"pung").unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, error.kind());
    }

    #[test]
    fn scripted_error_fails_next_read() {
        let mut transport = ScriptedTransport::new().expect_error("ping", io::ErrorKind::ConnectionReset);
        transport.write_all(b"ping").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(io::ErrorKind::ConnectionReset, transport.read(&mut buf).unwrap_err().kind());
        assert_eq!(io::ErrorKind::WouldBlock, transport.read(&mut buf).unwrap_err().kind());
    }

    #[test]
    fn unsolicited_bytes_wait_their_turn() {
        let mut transport = ScriptedTransport::new().expect("a", "1").unsolicited("2");
        let mut buf = [0u8; 4];
        transport.write_all(b"a").unwrap();
        assert_eq!(1, transport.read(&mut buf).unwrap());
        assert_eq!(b'1', buf[0]);
        assert_eq!(1, transport.read(&mut buf).unwrap());
        assert_eq!(b'2', buf[0]);
        transport.finish().unwrap();
    }

    #[test]
    fn unfinished_script_reported() {
        let transport = ScriptedTransport::new().expect("a", "1");
        assert!(matches!(transport.finish(), Err(ScriptError::Unfinished { remaining: 1 })));
    }
}
