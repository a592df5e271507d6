//! Serial and TCP transports for roadway device links.
//!
//! For the basic task of polling devices, you likely want to use the high-level API
//! in the [`roadlink`] crate instead.
//!
//! However, you can use [`SerialTransport`] or [`TcpTransport`] directly with the protocol
//! functions in [`roadlink_core`] if you're doing custom lower-level communication, and
//! [`configure_port`] to set up a serial port by hand.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use roadlink_core::{g4, DropAddress};
//! use roadlink_serial::SerialTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! let port = serial::open("/dev/ttyS0")?;
//! let mut transport = SerialTransport::new(port, 9600, Duration::from_secs(5))?;
//! let stats = g4::query_stats(&mut transport, DropAddress(12))?;
//! println!("{:?}", stats.samples.volume);
//! #
//! # Ok(()) }
//! ```
//!
//! [`roadlink`]: https://docs.rs/roadlink
#![doc(html_root_url = "https://docs.rs/roadlink-serial/0.4.0")]
#![deny(
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![warn(
    missing_docs,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]

mod connector;
mod errors;
mod serial_port;
mod serial_transport;
mod tcp_transport;

pub use self::connector::{connector_for, Connector, SerialConnector, TcpConnector};
pub use self::errors::TransportError;
pub use self::serial_port::configure_port;
pub use self::serial_transport::{SerialTransport, READ_INTERVAL};
pub use self::tcp_transport::TcpTransport;

pub(crate) const LOG_TARGET: &str = "roadlink::link";
