use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::frame_buffer::FrameBufferError;

/// Errors that can occur while exchanging a request and response with a device.
///
/// Every protocol layer in this crate reports failures through `CommError` so that
/// the link worker can apply one policy regardless of which protocol is spoken.
/// Use [`CommError::class`] to find out how a particular error should be handled.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CommError {
    /// A response was malformed (bad sentinel, length, structure or field value).
    #[error("Parsing error: {}", message)]
    Parsing {
        /// Description of what was wrong.
        message: String,
    },

    /// A data record's length didn't match the lane count announced by its header.
    #[error("Invalid lane count in {} record: Expected data length {}, got {}", record, expected, actual)]
    LaneCount {
        /// The kind of record that was rejected.
        record: &'static str,

        /// Data length implied by the header.
        expected: usize,

        /// Data length actually declared by the record.
        actual: usize,
    },

    /// A checksum or CRC didn't match the received data.
    #[error("Checksum error in {}: Expected 0x{:X}, got 0x{:X}", segment, expected, actual)]
    Checksum {
        /// The part of the message that failed to validate.
        segment: &'static str,

        /// The checksum computed over the received data.
        expected: u16,

        /// The checksum that was received.
        actual: u16,
    },

    /// The device reported an error of its own.
    #[error("Controller error: {}", message)]
    Controller {
        /// The device-supplied error text.
        message: String,
    },

    /// The response didn't correlate with the request (wrong type, sequence or address).
    #[error("Protocol error: {}", message)]
    Protocol {
        /// Description of the mismatch.
        message: String,
    },

    /// No complete response arrived before the deadline.
    #[error("Timed out after {:?} waiting for a response", elapsed)]
    Timeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// Incremental stream buffering failed.
    #[error("Stream buffer error")]
    Buffer {
        /// The underlying buffer error.
        #[from]
        source: FrameBufferError,
    },

    /// A field could not be encoded or decoded.
    #[error("Field codec error")]
    Codec {
        /// The underlying codec error.
        #[from]
        source: CodecError,
    },

    /// The transport failed.
    #[error("I/O error communicating with device")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },
}

/// Broad categories of [`CommError`] that determine how a failure is handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed data. Counted against the retry budget; the input is drained.
    Parsing,

    /// Corrupt data, likely line noise. Handled like [`ErrorClass::Parsing`] but logged distinctly.
    Checksum,

    /// Device-reported error. Counted against the retry budget.
    Controller,

    /// Request/response correlation failure. Fails the operation outright.
    Protocol,

    /// No response in time. Counted against the retry budget; the link stays up.
    Timeout,

    /// Transport failure. Counted against the retry budget and the link is reopened.
    Io,
}

impl CommError {
    /// Convenience constructor for [`CommError::Parsing`].
    pub fn parsing<S: Into<String>>(message: S) -> Self {
        CommError::Parsing {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`CommError::Controller`].
    pub fn controller<S: Into<String>>(message: S) -> Self {
        CommError::Controller {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`CommError::Protocol`].
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        CommError::Protocol {
            message: message.into(),
        }
    }

    /// Returns the [`ErrorClass`] of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io;
    /// use roadlink_core::{CommError, ErrorClass};
    ///
    /// let err = CommError::from(io::Error::new(io::ErrorKind::TimedOut, "no reply"));
    /// assert_eq!(ErrorClass::Timeout, err.class());
    ///
    /// let err = CommError::from(io::Error::new(io::ErrorKind::ConnectionReset, "gone"));
    /// assert_eq!(ErrorClass::Io, err.class());
    /// ```
    pub fn class(&self) -> ErrorClass {
        match self {
            CommError::Parsing { .. } | CommError::LaneCount { .. } | CommError::Codec { .. } => ErrorClass::Parsing,
            CommError::Checksum { .. } => ErrorClass::Checksum,
            CommError::Controller { .. } => ErrorClass::Controller,
            CommError::Protocol { .. } => ErrorClass::Protocol,
            CommError::Timeout { .. } => ErrorClass::Timeout,
            CommError::Buffer { source } => match source {
                FrameBufferError::CapacityExceeded { .. } => ErrorClass::Parsing,
                _ => ErrorClass::Protocol,
            },
            CommError::Io { source } => match source.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorClass::Timeout,
                _ => ErrorClass::Io,
            },
        }
    }
}
