//! The SS125 binary sensor protocol.
//!
//! Every packet is a fixed ten-byte header and a variable body, each followed by its own
//! CRC-8. Requests read or write a property identified by a message id; the sensor answers
//! reads with the property's value (possibly across several packets) and writes with a
//! result code. Sequence numbers are owned by the caller and advance with every exchange.
//!
//! # Examples
//!
//! ```
//! use roadlink_core::ss125::{DataConfig, Property, BINNING_INTERVAL};
//!
//! let config = DataConfig::default().to_polled(false);
//! assert_eq!(BINNING_INTERVAL, config.interval);
//! assert_eq!(b'd', config.msg_id());
//! ```
use log::{debug, trace, warn};

use crate::controller::DropAddress;
use crate::errors::CommError;
use crate::record::VehicleEvent;
use crate::transport::{self, Transport};

mod data_config;
mod date_time;
mod general_config;
mod interval_data;
mod message;
mod property;
mod vehicle_event;

pub use self::data_config::{DataConfig, PushConfig, StorageMode, BINNING_INTERVAL};
pub use self::date_time::DateTimeProperty;
pub use self::general_config::GeneralConfig;
pub use self::interval_data::{encode_interval_header, IntervalData, LaneInterval};
pub use self::message::{encode_packet, result_text, Body, Header, MsgType, HEADER_LEN, MAX_BODY, MIN_BODY};
pub use self::property::{
    Property, MSG_DATA_CONFIG, MSG_DATE_TIME, MSG_GENERAL_CONFIG, MSG_INTERVAL_DATA, MSG_VEHICLE_EVENT,
};
pub use self::vehicle_event::{encode_event, VehicleEventProperty};

pub(crate) const LOG_TARGET: &str = "roadlink::ss125";

/// Reads `prop` from the sensor at `drop`.
///
/// Stale input is drained before the request is sent. Multi-packet responses are read
/// until the property reports itself complete, each packet carrying the next sequence
/// number and message sub id. On success `seq` is left one past the last response's.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if a packet doesn't arrive in time, [`CommError::Protocol`]
/// if a response doesn't answer the request, [`CommError::Controller`] if the sensor
/// reports an error, or any parsing error from the property.
pub fn query<T, P>(transport: &mut T, drop: DropAddress, seq: &mut u8, prop: &mut P) -> Result<(), CommError>
where
    T: Transport + ?Sized,
    P: Property + ?Sized,
{
    transport.drain()?;
    let mut expect_body = Body::new(prop.msg_id(), MsgType::Read, prop.encode_read()?);
    let mut expect_header = Header::request(drop, *seq, expect_body.len());
    send(transport, &expect_header, &expect_body)?;
    loop {
        let (header, body) = receive(transport, &expect_header)?;
        body.check_reply_to(&expect_body)?;
        if body.msg_type == MsgType::Result {
            return Err(CommError::protocol("READ OR WRITE"));
        }
        prop.decode_payload(&body.payload)?;
        *seq = header.seq.wrapping_add(1);
        if prop.is_complete() {
            debug!(target: LOG_TARGET, "Read {}", prop);
            return Ok(());
        }
        expect_header.seq = header.seq;
        expect_body.sub_id = expect_body.sub_id.wrapping_add(1);
    }
}

/// Writes `prop` to the sensor at `drop`, which must answer with a successful result.
///
/// # Errors
///
/// Returns [`CommError::Controller`] with the sensor's error text if the result is
/// nonzero, or any of the errors [`query`] returns.
pub fn store<T, P>(transport: &mut T, drop: DropAddress, seq: &mut u8, prop: &P) -> Result<(), CommError>
where
    T: Transport + ?Sized,
    P: Property + ?Sized,
{
    transport.drain()?;
    let sent_body = Body::new(prop.msg_id(), MsgType::Write, prop.encode_write()?);
    let sent_header = Header::request(drop, *seq, sent_body.len());
    send(transport, &sent_header, &sent_body)?;
    let (header, body) = receive(transport, &sent_header)?;
    body.check_reply_to(&sent_body)?;
    if body.msg_type != MsgType::Result {
        return Err(CommError::protocol("READ OR WRITE"));
    }
    *seq = header.seq.wrapping_add(1);
    debug!(target: LOG_TARGET, "Stored {}", prop);
    Ok(())
}

/// Waits for one vehicle event pushed by the sensor at `drop`.
///
/// Returns `Ok(None)` if nothing at all arrives before the transport times out. Packets
/// from another sensor or carrying another message are read whole, logged and skipped,
/// also returning `Ok(None)`.
///
/// # Errors
///
/// Returns [`CommError::Timeout`] if a packet starts but doesn't finish in time, or any
/// parsing error from the packet or the event payload.
pub fn receive_event<T>(transport: &mut T, drop: DropAddress) -> Result<Option<VehicleEvent>, CommError>
where
    T: Transport + ?Sized,
{
    let mut head = match transport::read_exact(transport, 1) {
        Ok(first) => first,
        Err(CommError::Timeout { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    head.extend(transport::read_exact(transport, HEADER_LEN)?);
    let header = Header::parse(&head[..HEADER_LEN], head[HEADER_LEN])?;
    let body = read_body(transport, &header)?;
    if header.src != drop {
        warn!(target: LOG_TARGET, "Ignoring packet from {} while listening to {}", header.src, drop);
        return Ok(None);
    }
    if body.msg_id != MSG_VEHICLE_EVENT {
        warn!(target: LOG_TARGET, "Ignoring unexpected message {} from {}", body, drop);
        return Ok(None);
    }
    let mut prop = VehicleEventProperty::default();
    prop.decode_payload(&body.payload)?;
    Ok(prop.into_event())
}

fn send<T: Transport + ?Sized>(transport: &mut T, header: &Header, body: &Body) -> Result<(), CommError> {
    trace!(target: LOG_TARGET, "Sending {} {}", header, body);
    transport.write_all(&encode_packet(header, body))?;
    Ok(())
}

fn receive<T: Transport + ?Sized>(transport: &mut T, sent: &Header) -> Result<(Header, Body), CommError> {
    let head = transport::read_exact(transport, HEADER_LEN + 1)?;
    let header = Header::parse(&head[..HEADER_LEN], head[HEADER_LEN])?;
    header.check_reply_to(sent)?;
    let body = read_body(transport, &header)?;
    Ok((header, body))
}

fn read_body<T: Transport + ?Sized>(transport: &mut T, header: &Header) -> Result<Body, CommError> {
    let len = header.body_size()?;
    let bytes = transport::read_exact(transport, len + 1)?;
    let body = Body::parse(&bytes[..len], bytes[len])?;
    trace!(target: LOG_TARGET, "Received {} {}", header, body);
    Ok(body)
}
