use std::fmt::{self, Debug, Formatter};
use std::io;
use std::time::{Duration, Instant};

use crate::errors::CommError;

/// Abstraction over a half-duplex byte stream connected to one or more devices.
///
/// Typically `SerialTransport` or `TcpTransport` from [`roadlink-serial`] or `VirtualLink`
/// from [`roadlink-testing`] are sufficient, and you do not need to implement this yourself.
///
/// # Examples
///
/// Implementing a transport that answers every request with a fixed reply:
///
/// ```
/// use std::io;
/// use std::time::Duration;
/// use roadlink_core::{transport, Transport};
///
/// #[derive(Debug, Default)]
/// struct Echo {
///     pending: Vec<u8>,
/// }
///
/// impl Transport for Echo {
///     fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
///         self.pending.extend_from_slice(bytes);
///         Ok(())
///     }
///
///     fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
///         let n = buf.len().min(self.pending.len());
///         buf[..n].copy_from_slice(&self.pending[..n]);
///         let _ = self.pending.drain(..n);
///         Ok(n)
///     }
///
///     fn timeout(&self) -> Duration {
///         Duration::from_millis(10)
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut echo = Echo::default();
/// echo.write_all(b"ping")?;
/// assert_eq!(b"ping".to_vec(), transport::read_exact(&mut echo, 4)?);
/// #
/// # Ok(()) }
/// ```
///
/// [`roadlink-serial`]: https://docs.rs/roadlink-serial
/// [`roadlink-testing`]: https://docs.rs/roadlink-testing
pub trait Transport {
    /// Writes an entire request to the link.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever bytes are available, waiting up to a short, implementation-defined interval.
    ///
    /// Returns `Ok(0)` or an error of kind `TimedOut`/`WouldBlock` if nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Overall time allowed for a complete response to arrive.
    fn timeout(&self) -> Duration;

    /// Discards any unread input, typically after a corrupt response.
    fn drain(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 256];
        loop {
            match self.read(&mut scratch) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) if is_timeout(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

// Provide a Debug representation so types that contain trait objects can derive Debug.
impl Debug for dyn Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Transport trait>")
    }
}

impl Debug for dyn Transport + Send {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Transport trait>")
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }
}

/// Returns whether an I/O error just means no data arrived in time.
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Reads once, mapping "nothing yet" to `Ok(0)`.
pub fn read_some<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<usize, CommError> {
    match transport.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if is_timeout(&e) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Reads exactly `len` bytes before the transport's timeout elapses.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if the bytes don't all arrive in time, or
/// [`CommError::Io`] if the transport fails.
pub fn read_exact<T: Transport + ?Sized>(transport: &mut T, len: usize) -> Result<Vec<u8>, CommError> {
    let start = Instant::now();
    let timeout = transport.timeout();
    let mut bytes = vec![0u8; len];
    let mut pos = 0;
    while pos < len {
        let n = read_some(transport, &mut bytes[pos..])?;
        pos += n;
        if n == 0 && start.elapsed() >= timeout {
            return Err(CommError::Timeout { elapsed: start.elapsed() });
        }
    }
    Ok(bytes)
}

/// Accumulates bytes until `is_complete` accepts them or the transport's timeout elapses.
///
/// `is_complete` is called after every read that returns data, so it should be cheap.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if a complete response doesn't arrive in time, or
/// [`CommError::Io`] if the transport fails.
pub fn read_until<T, F>(transport: &mut T, mut is_complete: F) -> Result<Vec<u8>, CommError>
where
    T: Transport + ?Sized,
    F: FnMut(&[u8]) -> bool,
{
    let start = Instant::now();
    let timeout = transport.timeout();
    let mut bytes = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = read_some(transport, &mut chunk)?;
        if n > 0 {
            bytes.extend_from_slice(&chunk[..n]);
            if is_complete(&bytes) {
                return Ok(bytes);
            }
        } else if start.elapsed() >= timeout {
            return Err(CommError::Timeout { elapsed: start.elapsed() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug)]
    struct Chunks {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Chunks {
        fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            Chunks { chunks: chunks.into() }
        }
    }

    impl Transport for Chunks {
        fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }
    }

    #[test]
    fn read_exact_spans_chunks_and_timeouts() {
        let mut t = Chunks::new(vec![
            Ok(vec![1, 2]),
            Err(io::ErrorKind::WouldBlock.into()),
            Ok(vec![3]),
        ]);
        assert_eq!(vec![1, 2, 3], read_exact(&mut t, 3).unwrap());
    }

    #[test]
    fn read_exact_times_out() {
        let mut t = Chunks::new(vec![Ok(vec![1])]);
        let error = read_exact(&mut t, 2).unwrap_err();
        assert!(matches!(error, CommError::Timeout { .. }));
    }

    #[test]
    fn read_until_stops_when_complete() {
        let mut t = Chunks::new(vec![Ok(b"ab".to_vec()), Ok(b"c;".to_vec()), Ok(b"more".to_vec())]);
        let bytes = read_until(&mut t, |b| b.ends_with(b";")).unwrap();
        assert_eq!(b"abc;".to_vec(), bytes);
    }

    #[test]
    fn hard_errors_propagate() {
        let mut t = Chunks::new(vec![Err(io::ErrorKind::BrokenPipe.into())]);
        let error = read_until(&mut t, |_| false).unwrap_err();
        assert!(matches!(error, CommError::Io { .. }));
    }

    #[test]
    fn drain_discards_pending() {
        let mut t = Chunks::new(vec![Ok(vec![9; 10]), Ok(vec![9; 3])]);
        t.drain().unwrap();
        assert!(t.chunks.is_empty());
    }
}
