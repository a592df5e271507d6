use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};

use roadlink_core::Transport;

use crate::errors::TransportError;
use crate::serial_transport::READ_INTERVAL;
use crate::LOG_TARGET;

/// A [`Transport`] over a TCP connection, typically to a terminal server or sign server.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    timeout: Duration,
}

impl TcpTransport {
    /// Connects to `address` (`host:port`), allowing `timeout` for the connection and for
    /// each response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the address can't be resolved or no connection
    /// can be made.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use roadlink_serial::TcpTransport;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// #
    /// let transport = TcpTransport::connect("10.0.0.12:4001", Duration::from_secs(5))?;
    /// #
    /// # Ok(()) }
    /// ```
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let connect_error = |source| TransportError::Connect {
            address: address.to_string(),
            source,
        };
        let addrs: Vec<SocketAddr> = address.to_socket_addrs().map_err(connect_error)?.collect();
        let mut last = io::Error::new(io::ErrorKind::NotFound, "Address resolved to nothing");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!(target: LOG_TARGET, "Connected to {}", addr);
                    return Self::from_stream(stream, timeout).map_err(connect_error);
                }
                Err(e) => last = e,
            }
        }
        Err(connect_error(last))
    }

    /// Wraps an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream's options can't be set.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(READ_INTERVAL.min(timeout)))?;
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream, timeout })
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!(target: LOG_TARGET, "Writing {} bytes", bytes.len());
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf)? {
            0 if !buf.is_empty() => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "Connection closed by remote host",
            )),
            n => {
                trace!(target: LOG_TARGET, "Read {} bytes", n);
                Ok(n)
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    use roadlink_core::transport;

    #[test]
    fn echo_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4];
            stream.read_exact(&mut request).unwrap();
            stream.write_all(&request).unwrap();
        });

        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap();
        transport.write_all(b"ping").unwrap();
        assert_eq!(b"ping".to_vec(), transport::read_exact(&mut transport, 4).unwrap());
        server.join().unwrap();
    }

    #[test]
    fn closed_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || drop(listener.accept().unwrap()));

        let mut transport = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap();
        server.join().unwrap();
        let mut buf = [0u8; 8];
        let error = loop {
            match transport.read(&mut buf) {
                Err(e) if !transport::is_timeout(&e) => break e,
                _ => {}
            }
        };
        assert!(matches!(
            error.kind(),
            io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
        ));
    }

    #[test]
    fn unresolvable_address_rejected() {
        let error = TcpTransport::connect("not an address", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(error, TransportError::Connect { .. }));
    }
}
