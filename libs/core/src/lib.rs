//! Core types for communicating with roadway signs and vehicle detection sensors.
//!
//! For the basic task of polling devices on a link, you likely want to use the high-level
//! API in the [`roadlink`] crate instead.
//!
//! However, `roadlink_core` is useful for crates that want to speak one of the device
//! protocols directly, or who want to provide their own [`Transport`] or [`Controller`]
//! implementations for use by `roadlink`. Three protocols are supported:
//!
//! * [`g4`]: a binary sensor protocol of leader-delimited frames with an additive checksum.
//! * [`ss125`]: a binary sensor protocol of header and body packets, each with a CRC-8.
//! * [`dmsxml`]: an XML protocol for dynamic message signs.
//!
//! All of them report failures as a [`CommError`] whose [`ErrorClass`] decides how a
//! failed exchange is handled.
//!
//! # Examples
//!
//! ```
//! use roadlink_core::{ClassTable, VehClass};
//!
//! // Sensors don't transmit the smallest length class; it is whatever is left
//! // of the lane total after the explicit classes.
//! let mut classes = ClassTable::new(3, 1);
//! classes.set(VehClass(1), 0, 4);
//! classes.set(VehClass(2), 0, 3);
//! classes.derive_smallest(&[Some(10)]);
//! assert_eq!(Some(3), classes.get(VehClass::SMALLEST, 0));
//! ```
//!
//! [`roadlink`]: https://docs.rs/roadlink
#![doc(html_root_url = "https://docs.rs/roadlink-core/0.4.0")]
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

mod checksum;
pub mod codec;
mod controller;
pub mod dmsxml;
mod errors;
mod frame_buffer;
pub mod g4;
mod record;
pub mod ss125;
pub mod transport;

pub use self::checksum::{Additive16, Checksum, Crc8};
pub use self::codec::CodecError;
pub use self::controller::{Controller, DropAddress, MessageStatus, SignConfig, SignDevice};
pub use self::errors::{CommError, ErrorClass};
pub use self::frame_buffer::{Extract, FrameBuffer, FrameBufferError};
pub use self::record::{
    ClassTable, LaneSamples, SpeedUnits, TimestampWindow, VehClass, VehicleEvent, MAX_LANES, MAX_SCANS,
};
pub use self::transport::Transport;
