use std::io::{self, Read, Write};
use std::time::Duration;

use log::trace;
use serial_core::prelude::*;

use roadlink_core::Transport;

use crate::errors::TransportError;
use crate::serial_port;
use crate::LOG_TARGET;

/// How long a single read waits for bytes before reporting that nothing arrived.
pub const READ_INTERVAL: Duration = Duration::from_millis(100);

/// A [`Transport`] over a serial port shared by one or more devices.
///
/// Requests and responses are logged using the [`log`] crate at trace level; the protocol
/// layers above log decoded messages at debug level. Consuming binaries typically use the
/// [`env_logger`] crate and can be run with `RUST_LOG=roadlink=debug` to watch the link.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use roadlink_serial::SerialTransport;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let port = serial::open("/dev/ttyUSB0")?;
/// let transport = SerialTransport::new(port, 9600, Duration::from_secs(5))?;
/// // Can now poll devices on the link.
/// #
/// # Ok(()) }
/// ```
///
/// [`log`]: https://crates.io/crates/log
/// [`env_logger`]: https://crates.io/crates/env_logger
#[derive(Debug, Eq, PartialEq, Hash)]
pub struct SerialTransport<P: SerialPort> {
    port: P,
    timeout: Duration,
}

impl<P: SerialPort> SerialTransport<P> {
    /// Creates a transport over `port` at `baud`, allowing `timeout` for each response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] or [`TransportError::UnsupportedBaud`]
    /// if the serial port cannot be configured.
    pub fn new(mut port: P, baud: u32, timeout: Duration) -> Result<Self, TransportError> {
        serial_port::configure_port(&mut port, baud, READ_INTERVAL.min(timeout))?;
        Ok(SerialTransport { port, timeout })
    }

    /// Returns a reference to the underlying serial port.
    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P: SerialPort> Transport for SerialTransport<P> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!(target: LOG_TARGET, "Writing {:02X?}", bytes);
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.port.read(buf)?;
        if n > 0 {
            trace!(target: LOG_TARGET, "Read {:02X?}", &buf[..n]);
        }
        Ok(n)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
