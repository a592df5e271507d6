use std::fmt::Display;

use crate::errors::CommError;

/// Message id of the general configuration property.
pub const MSG_GENERAL_CONFIG: u8 = b'g';

/// Message id of the data configuration property.
pub const MSG_DATA_CONFIG: u8 = b'd';

/// Message id of the date/time property.
pub const MSG_DATE_TIME: u8 = b'e';

/// Message id of the interval data property.
pub const MSG_INTERVAL_DATA: u8 = b'i';

/// Message id of pushed vehicle events.
pub const MSG_VEHICLE_EVENT: u8 = b'v';

/// A value that can be read from (and possibly written to) an SS125 sensor.
///
/// Payload offsets are relative to the end of the three-byte body prefix.
pub trait Property: Display {
    /// The message id identifying this property.
    fn msg_id(&self) -> u8;

    /// Payload of a read request.
    fn encode_read(&self) -> Result<Vec<u8>, CommError> {
        Ok(Vec::new())
    }

    /// Payload of a write request.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Protocol`] by default, for read-only properties.
    fn encode_write(&self) -> Result<Vec<u8>, CommError> {
        Err(CommError::protocol(format!("'{}' is read only", char::from(self.msg_id()))))
    }

    /// Decodes the payload of one response packet.
    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError>;

    /// Whether every packet of a multi-packet response has been decoded.
    fn is_complete(&self) -> bool {
        true
    }
}

/// Checks that a payload has exactly `len` bytes.
pub(crate) fn check_len(name: &str, payload: &[u8], len: usize) -> Result<(), CommError> {
    if payload.len() != len {
        return Err(CommError::parsing(format!(
            "Invalid {} payload length: expected {}, got {}",
            name,
            len,
            payload.len()
        )));
    }
    Ok(())
}
