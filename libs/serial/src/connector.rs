use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use log::info;

use roadlink_core::Transport;

use crate::errors::TransportError;
use crate::serial_transport::SerialTransport;
use crate::tcp_transport::TcpTransport;
use crate::LOG_TARGET;

/// Opens (and reopens) the transport for one link.
///
/// A link worker holds a connector rather than a transport so that it can reconnect
/// after an I/O failure.
pub trait Connector: Send {
    /// Where the link goes, for logging.
    fn uri(&self) -> &str;

    /// Opens a fresh transport.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the link can't be opened.
    fn connect(&mut self) -> Result<Box<dyn Transport + Send>, TransportError>;
}

// Provide a Debug representation so types that contain trait objects can derive Debug.
impl Debug for dyn Connector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Connector {}>", self.uri())
    }
}

/// Connects to `host:port` over TCP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector for `address`, allowing `timeout` per response.
    pub fn new<S: Into<String>>(address: S, timeout: Duration) -> Self {
        TcpConnector {
            address: address.into(),
            timeout,
        }
    }
}

impl Connector for TcpConnector {
    fn uri(&self) -> &str {
        &self.address
    }

    fn connect(&mut self) -> Result<Box<dyn Transport + Send>, TransportError> {
        info!(target: LOG_TARGET, "Connecting to {}", self.address);
        Ok(Box::new(TcpTransport::connect(&self.address, self.timeout)?))
    }
}

/// Opens a local serial port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialConnector {
    path: String,
    baud: u32,
    timeout: Duration,
}

impl SerialConnector {
    /// Creates a connector for the port at `path`, allowing `timeout` per response.
    pub fn new<S: Into<String>>(path: S, baud: u32, timeout: Duration) -> Self {
        SerialConnector {
            path: path.into(),
            baud,
            timeout,
        }
    }
}

impl Connector for SerialConnector {
    fn uri(&self) -> &str {
        &self.path
    }

    fn connect(&mut self) -> Result<Box<dyn Transport + Send>, TransportError> {
        info!(target: LOG_TARGET, "Opening {} at {} baud", self.path, self.baud);
        let port = serial::open(&self.path).map_err(|source| TransportError::Open {
            path: self.path.clone(),
            source,
        })?;
        Ok(Box::new(SerialTransport::new(port, self.baud, self.timeout)?))
    }
}

/// Returns the connector for a link URI.
///
/// `host:port` (where the port is numeric) selects TCP; anything else is taken as a serial
/// device path.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUri`] if `uri` is empty.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use roadlink_serial::connector_for;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let tcp = connector_for("10.0.0.12:4001", 9600, Duration::from_secs(5))?;
/// assert_eq!("10.0.0.12:4001", tcp.uri());
///
/// let serial = connector_for("/dev/ttyS0", 9600, Duration::from_secs(5))?;
/// assert_eq!("/dev/ttyS0", serial.uri());
/// #
/// # Ok(()) }
/// ```
pub fn connector_for(uri: &str, baud: u32, timeout: Duration) -> Result<Box<dyn Connector>, TransportError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(TransportError::InvalidUri { uri: uri.to_string() });
    }
    let is_tcp = uri
        .rsplit_once(':')
        .map_or(false, |(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if is_tcp {
        Ok(Box::new(TcpConnector::new(uri, timeout)))
    } else {
        Ok(Box::new(SerialConnector::new(uri, baud, timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("127.0.0.1:4001", "127.0.0.1:4001" ; "ipv4")]
    #[test_case("dms-server.local:8080", "dms-server.local:8080" ; "hostname")]
    #[test_case("/dev/ttyUSB0", "/dev/ttyUSB0" ; "device path")]
    #[test_case("COM3", "COM3" ; "windows port")]
    #[test_case(" /dev/ttyS1 ", "/dev/ttyS1" ; "trimmed")]
    fn uri_kept(uri: &str, expected: &str) {
        let connector = connector_for(uri, 9600, Duration::from_secs(1)).unwrap();
        assert_eq!(expected, connector.uri());
    }

    #[test]
    fn empty_uri_rejected() {
        let error = connector_for("  ", 9600, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(error, TransportError::InvalidUri { .. }));
    }

    #[test]
    fn refused_tcp_connection_reported() {
        // Bind then drop to find a port nothing is listening on.
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let mut connector = TcpConnector::new(format!("127.0.0.1:{}", port), Duration::from_millis(200));
        assert!(matches!(connector.connect(), Err(TransportError::Connect { .. })));
    }
}
