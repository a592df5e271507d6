//! The G4 binary sensor protocol: leader-delimited frames with a 16-bit additive checksum.
//!
//! A statistics poll is a single data request answered by a burst of frames: a header,
//! one frame per statistic (volume, occupancy, speed and per-class counts, each with one
//! value per lane), and an end frame. Setup and clock properties are single frames.
//!
//! # Examples
//!
//! ```
//! use roadlink_core::DropAddress;
//! use roadlink_core::g4::{self, G4Frame, Qualifier};
//!
//! let request = G4Frame::data_request(DropAddress(1)).to_bytes();
//! assert_eq!(Some(Qualifier::DataRequest), g4::Qualifier::from_code(request[2]));
//! ```
use log::debug;

use crate::controller::DropAddress;
use crate::errors::CommError;
use crate::transport::{self, Transport};

mod frame;
mod setup;
mod stats;

pub use self::frame::{is_read_complete, subdivide, G4Frame, Qualifier, LEADER, STATS_END_LEN};
pub use self::setup::{PortConfig, PortMode, Rtc, SetupInfo, StatComposition, StatusFlags};
pub use self::stats::{Statistics, StatsHeader, BINNING_PERIOD};

pub(crate) const LOG_TARGET: &str = "roadlink::g4";

/// Requests the latest statistics from `drop` and decodes the response.
///
/// Bytes are accumulated until an end frame arrives or the transport times out.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if no end frame arrives in time, or any decoding error
/// from [`Statistics::decode`].
pub fn query_stats<T: Transport + ?Sized>(transport: &mut T, drop: DropAddress) -> Result<Statistics, CommError> {
    let request = G4Frame::data_request(drop);
    debug!(target: LOG_TARGET, "Sending {}", request);
    transport.write_all(&request.to_bytes())?;
    let bytes = transport::read_until(transport, is_read_complete)?;
    Statistics::decode(&bytes)
}

/// Sends `request` and waits for a frame from the same sensor with qualifier `expect`.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if no matching frame arrives in time, or
/// [`CommError::Checksum`] if a corrupt frame arrives instead.
pub fn transact<T: Transport + ?Sized>(
    transport: &mut T,
    request: &G4Frame,
    expect: Qualifier,
) -> Result<G4Frame, CommError> {
    debug!(target: LOG_TARGET, "Sending {}", request);
    transport.write_all(&request.to_bytes())?;
    let sensor = request.sensor_id;
    let matches = |frame: &G4Frame| frame.qualifier == expect && frame.sensor_id == sensor;
    let bytes = transport::read_until(transport, |bytes| match subdivide(bytes) {
        Ok(frames) => frames.iter().any(matches),
        Err(_) => true,
    })?;
    let response = subdivide(&bytes)?
        .into_iter()
        .find(matches)
        .ok_or_else(|| CommError::protocol(format!("No {} response from sensor {:04X}", expect, sensor)))?;
    debug!(target: LOG_TARGET, "Received {}", response);
    Ok(response)
}
