use std::io;

use thiserror::Error;

/// Errors that can occur while opening or configuring a link transport.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The serial port couldn't be configured.
    #[error("Failed to configure serial port")]
    Configuration {
        /// The underlying serial error.
        #[from]
        source: serial_core::Error,
    },

    /// The serial port couldn't be opened.
    #[error("Failed to open serial port {}", path)]
    Open {
        /// Device path of the port.
        path: String,

        /// The underlying serial error.
        #[source]
        source: serial_core::Error,
    },

    /// A TCP connection couldn't be established.
    #[error("Failed to connect to {}", address)]
    Connect {
        /// The remote address.
        address: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A link URI was neither `host:port` nor a device path.
    #[error("Invalid link URI {:?}", uri)]
    InvalidUri {
        /// The offending URI.
        uri: String,
    },

    /// The requested baud rate isn't supported.
    #[error("Unsupported baud rate {}", baud)]
    UnsupportedBaud {
        /// The requested rate.
        baud: u32,
    },
}
