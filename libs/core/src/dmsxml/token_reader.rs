use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::errors::CommError;
use crate::frame_buffer::{Extract, FrameBuffer, FrameBufferError};
use crate::transport::{self, Transport};

use super::LOG_TARGET;

const INITIAL_SIZE: usize = 1024;
const MAX_SIZE: usize = 16384;
const DEFAULT_PAUSE: Duration = Duration::from_millis(50);

const _: () = assert!(INITIAL_SIZE <= MAX_SIZE);

/// Reassembles delimited text tokens from a byte stream that arrives in arbitrary pieces.
///
/// Anything before a token's start marker is discarded along with the token itself once it
/// is extracted; bytes after it stay buffered for the next read.
#[derive(Debug)]
pub struct TokenReader {
    buffer: FrameBuffer,
    pause: Duration,
}

impl TokenReader {
    /// Creates a reader with a 1 KiB buffer that may grow to 16 KiB.
    pub fn new() -> Self {
        TokenReader {
            buffer: FrameBuffer::clamped(INITIAL_SIZE, MAX_SIZE),
            pause: DEFAULT_PAUSE,
        }
    }

    /// Creates a reader with custom buffer sizes and pause between empty reads.
    ///
    /// # Errors
    ///
    /// Returns [`FrameBufferError::InvalidAllocation`] if `alloc` exceeds `max`.
    pub fn with_sizes(alloc: usize, max: usize, pause: Duration) -> Result<Self, FrameBufferError> {
        Ok(TokenReader {
            buffer: FrameBuffer::new(alloc, max)?,
            pause,
        })
    }

    /// Discards buffered input.
    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    /// Reads until a complete `start`...`end` token is buffered or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Buffer`] if the buffer would exceed its maximum size, or
    /// [`CommError::Io`] if the transport fails.
    pub fn read_token<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        timeout: Duration,
        start: &str,
        end: &str,
    ) -> Result<Option<String>, CommError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 512];
        loop {
            if let Some(token) = self
                .buffer
                .extract(Extract::DiscardThrough, start.as_bytes(), end.as_bytes())?
            {
                return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
            }
            let n = transport::read_some(transport, &mut chunk)?;
            if n > 0 {
                trace!(target: LOG_TARGET, "Buffered {} bytes", n);
                self.buffer.append(&chunk[..n])?;
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.pause.min(deadline - now));
        }
    }
}

impl Default for TokenReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug)]
    struct Pieces(VecDeque<Vec<u8>>);

    impl Transport for Pieces {
        fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(piece) => {
                    buf[..piece.len()].copy_from_slice(&piece);
                    Ok(piece.len())
                }
                None => Ok(0),
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn reader() -> TokenReader {
        TokenReader::with_sizes(8, 256, Duration::from_millis(1)).unwrap()
    }

    #[test]
    fn default_buffer_sizes() {
        let reader = TokenReader::new();
        assert_eq!(INITIAL_SIZE, reader.buffer.capacity());
        assert_eq!(MAX_SIZE, reader.buffer.max_size());
        assert_eq!(DEFAULT_PAUSE, reader.pause);
    }

    #[test]
    fn token_split_across_reads() {
        let mut pieces = Pieces(
            vec![b"noise<Dm".to_vec(), b"sXml><a>1</a></Dms".to_vec(), b"Xml><DmsXml>".to_vec()].into(),
        );
        let mut reader = reader();
        let token = reader
            .read_token(&mut pieces, Duration::from_millis(100), "<DmsXml>", "</DmsXml>")
            .unwrap();
        assert_eq!(Some("<DmsXml><a>1</a></DmsXml>".to_string()), token);
        assert_eq!(b"<DmsXml>", reader.buffer.as_bytes());
    }

    #[test]
    fn second_token_already_buffered() {
        let mut pieces = Pieces(vec![b"<R>1</R><R>2</R>".to_vec()].into());
        let mut reader = reader();
        let timeout = Duration::from_millis(50);
        assert_eq!(Some("<R>1</R>".into()), reader.read_token(&mut pieces, timeout, "<R>", "</R>").unwrap());
        assert_eq!(Some("<R>2</R>".into()), reader.read_token(&mut pieces, timeout, "<R>", "</R>").unwrap());
    }

    #[test]
    fn timeout_returns_none() {
        let mut pieces = Pieces(vec![b"<R>partial".to_vec()].into());
        let mut reader = reader();
        let token = reader
            .read_token(&mut pieces, Duration::from_millis(20), "<R>", "</R>")
            .unwrap();
        assert_eq!(None, token);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut pieces = Pieces(vec![vec![b'x'; 200], vec![b'x'; 200]].into());
        let mut reader = reader();
        let error = reader
            .read_token(&mut pieces, Duration::from_millis(50), "<R>", "</R>")
            .unwrap_err();
        assert!(matches!(error, CommError::Buffer { .. }));
    }
}
