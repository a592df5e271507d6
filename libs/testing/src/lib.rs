//! Tools for testing and debugging roadway device communications.
//!
//! For the basic task of polling devices, you likely want to use the high-level API
//! in the [`roadlink`] crate instead.
//!
//! This crate isn't needed to talk to real devices, but provides stand-ins for everything
//! on the far side of a link. [`VirtualLink`] is a general-purpose mock [`Transport`] that
//! feeds requests to one or more simulated devices ([`VirtualG4`], [`VirtualSs125`] and
//! [`VirtualDms`]); [`ScriptedTransport`] plays back an exact conversation byte for byte; and
//! [`MockController`] records everything an operation reports.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use roadlink_core::ss125::{self, GeneralConfig};
//! use roadlink_core::DropAddress;
//! use roadlink_testing::{VirtualLink, VirtualSs125};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(20))));
//! let mut link = VirtualLink::new().with_device(sensor.clone());
//!
//! let mut seq = 0;
//! let mut config = GeneralConfig::default();
//! ss125::query(&mut link, DropAddress(20), &mut seq, &mut config)?;
//! assert!(config.metric);
//! #
//! # Ok(()) }
//! ```
//!
//! [`roadlink`]: https://docs.rs/roadlink
//! [`Transport`]: roadlink_core::Transport
#![doc(html_root_url = "https://docs.rs/roadlink-testing/0.4.0")]
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

mod errors;
mod mock_controller;
mod scripted_transport;
mod virtual_dms;
mod virtual_g4;
mod virtual_link;
mod virtual_ss125;

pub use self::errors::ScriptError;
pub use self::mock_controller::{ControllerCall, MockController};
pub use self::scripted_transport::{Reply, ScriptedTransport};
pub use self::virtual_dms::{ShownMessage, VirtualDms};
pub use self::virtual_g4::VirtualG4;
pub use self::virtual_link::{SharedDevice, VirtualConnector, VirtualDevice, VirtualLink};
pub use self::virtual_ss125::VirtualSs125;
