//! A communication engine for roadway field devices: vehicle detection sensors and dynamic message signs.
//!
//! Each communication link (a serial port or a TCP connection) is driven by a [`LinkWorker`] thread that takes
//! operations from a priority [`OpQueue`] and runs them one at a time against the devices on the link. Operations
//! are built from protocol specific [`Transaction`]s, which step through their phases, read the device's
//! configuration first when needed, and are retried according to a [`RetryPolicy`].
//!
//! Three protocols are supported:
//!
//! - [`g4`]: binary frames to G4 radar sensors, polled for 30 second statistics.
//! - [`ss125`]: binary frames to SS125 radar sensors, polled for binned interval data and optionally
//!   listened to for individual vehicle events.
//! - [`dmsxml`]: XML documents to a sign server fronting dynamic message signs.
//!
//! Results are reported through the [`Controller`](crate::core::Controller) trait, which the host system implements.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use roadlink::{G4Poller, LinkConfig, LinkWorker, Poller, Protocol};
//! use roadlink_core::{Controller, DropAddress};
//! # use roadlink_testing::MockController;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! // Describe the link and start a worker thread for it.
//! let config = LinkConfig::new("radar_1", Protocol::G4, "10.2.0.40:4001");
//! let handle = LinkWorker::from_config(&config)?.spawn()?;
//!
//! // Schedule polls of the sensors on the link.
//! let poller = G4Poller::new(handle.queue(), config.retry_policy());
//! let sensor: Arc<dyn Controller> = Arc::new(MockController::new("G4_12", DropAddress(12)));
//! poller.poll(&sensor);
//!
//! // Queued operations are abandoned when the worker stops.
//! handle.stop()?;
//! #
//! # Ok(()) }
//! ```
//!
//! # Sub-crates
//!
//! - [`roadlink-core`] \(re-exported as `core`\) contains the protocol codecs, the [`Transport`](crate::core::Transport)
//!   and [`Controller`](crate::core::Controller) traits, and the record types stored on controllers.
//! - [`roadlink-serial`] \(re-exported as `serial`\) contains serial port and TCP transports and the connectors
//!   that open them.
//! - [`roadlink-testing`] contains simulated devices and a mock controller, useful for testing without hardware.
//!
//! [`roadlink-core`]: https://docs.rs/roadlink-core
//! [`roadlink-serial`]: https://docs.rs/roadlink-serial
//! [`roadlink-testing`]: https://docs.rs/roadlink-testing
#![doc(html_root_url = "https://docs.rs/roadlink/0.4.0")]
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

pub use roadlink_core as core;
pub use roadlink_serial as serial;

mod config;
mod errors;
mod link_worker;
mod op_queue;
mod operation;
mod poller;

pub mod dmsxml;
pub mod g4;
pub mod ss125;

pub use self::config::{LinkConfig, LinksFile, Protocol};
pub use self::errors::{ConfigError, LinkError};
pub use self::link_worker::{LinkHandle, LinkWorker};
pub use self::op_queue::OpQueue;
pub use self::operation::{
    ConfigGuard, Configure, Disposition, Guarded, Op, Operation, Priority, Progress, RetryPolicy, Transaction,
};
pub use self::poller::{DeviceRequest, DmsPoller, G4Poller, Poller, Ss125Poller};
