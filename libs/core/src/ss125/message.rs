use std::fmt::{self, Display, Formatter};

use crate::checksum::{Checksum, Crc8};
use crate::controller::DropAddress;
use crate::errors::CommError;

/// First header byte of every packet.
pub const SENTINEL: u8 = b'Z';

/// Second header byte: protocol version.
pub const VERSION: u8 = b'1';

/// Header length, not counting its CRC.
pub const HEADER_LEN: usize = 10;

/// Largest body, not counting its CRC.
pub const MAX_BODY: usize = 244;

/// Smallest body: message id, sub id and type.
pub const MIN_BODY: usize = 3;

/// Kind of a message body.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Read a property.
    Read,

    /// Write a property.
    Write,

    /// Result of a request, carrying a status code.
    Result,
}

impl MsgType {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            MsgType::Read => 0,
            MsgType::Write => 1,
            MsgType::Result => 2,
        }
    }

    /// Returns the type for a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MsgType::Read),
            1 => Some(MsgType::Write),
            2 => Some(MsgType::Result),
            _ => None,
        }
    }
}

/// Packet header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    /// Destination sub id.
    pub dest_sub: u8,

    /// Destination address.
    pub dest: DropAddress,

    /// Source sub id.
    pub src_sub: u8,

    /// Source address.
    pub src: DropAddress,

    /// Sequence number.
    pub seq: u8,

    /// Length of the body, not counting its CRC.
    pub body_len: u8,
}

impl Header {
    /// A header for a request from the host (address 0) to `dest`.
    pub fn request(dest: DropAddress, seq: u8, body_len: usize) -> Self {
        Header {
            dest_sub: 0,
            dest,
            src_sub: 0,
            src: DropAddress(0),
            seq,
            body_len: body_len as u8,
        }
    }

    /// Serializes the header without its CRC.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let dest = self.dest.to_be_bytes();
        let src = self.src.to_be_bytes();
        [
            SENTINEL,
            VERSION,
            self.dest_sub,
            dest[0],
            dest[1],
            self.src_sub,
            src[0],
            src[1],
            self.seq,
            self.body_len,
        ]
    }

    /// Validates a received header and its CRC.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Checksum`] for a bad CRC and [`CommError::Parsing`] for a bad
    /// sentinel or version.
    pub fn parse(bytes: &[u8], crc: u8) -> Result<Self, CommError> {
        if bytes.len() != HEADER_LEN {
            return Err(CommError::parsing("HEADER LENGTH"));
        }
        check_crc("HEADER", bytes, crc)?;
        if bytes[0] != SENTINEL {
            return Err(CommError::parsing("SENTINEL"));
        }
        if bytes[1] != VERSION {
            return Err(CommError::parsing("VERSION"));
        }
        Ok(Header {
            dest_sub: bytes[2],
            dest: DropAddress(u16::from_be_bytes([bytes[3], bytes[4]])),
            src_sub: bytes[5],
            src: DropAddress(u16::from_be_bytes([bytes[6], bytes[7]])),
            seq: bytes[8],
            body_len: bytes[9],
        })
    }

    /// Returns the declared body length after checking it is within bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the length is outside 3 to 244 bytes.
    pub fn body_size(&self) -> Result<usize, CommError> {
        let len = usize::from(self.body_len);
        if !(MIN_BODY..=MAX_BODY).contains(&len) {
            return Err(CommError::parsing("BODY SIZE"));
        }
        Ok(len)
    }

    /// Checks that this received header answers `sent`.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Protocol`] if the addresses aren't swapped or the sequence
    /// number isn't one past the request's.
    pub fn check_reply_to(&self, sent: &Header) -> Result<(), CommError> {
        if self.dest_sub != sent.src_sub {
            return Err(CommError::protocol("DEST SUB ID"));
        }
        if self.dest != sent.src {
            return Err(CommError::protocol("DEST ID"));
        }
        if self.src_sub != sent.dest_sub {
            return Err(CommError::protocol("SRC SUB ID"));
        }
        if self.src != sent.dest {
            return Err(CommError::protocol("SRC ID"));
        }
        if self.seq != sent.seq.wrapping_add(1) {
            return Err(CommError::protocol(format!(
                "SEQUENCE: expected {}, got {}",
                sent.seq.wrapping_add(1),
                self.seq
            )));
        }
        Ok(())
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}.{} -> {:04X}.{} seq {} len {}",
            self.src, self.src_sub, self.dest, self.dest_sub, self.seq, self.body_len
        )
    }
}

/// Packet body: message id, sub id, type and payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Body {
    /// Message id, identifying the property.
    pub msg_id: u8,

    /// Message sub id; the packet number of a multi-packet response.
    pub sub_id: u8,

    /// Message type.
    pub msg_type: MsgType,

    /// Payload following the first three bytes.
    pub payload: Vec<u8>,
}

impl Body {
    /// Creates a body.
    pub fn new(msg_id: u8, msg_type: MsgType, payload: Vec<u8>) -> Self {
        Body {
            msg_id,
            sub_id: 0,
            msg_type,
            payload,
        }
    }

    /// Length of the serialized body without its CRC.
    pub fn len(&self) -> usize {
        MIN_BODY + self.payload.len()
    }

    /// Always false; a body has at least three bytes.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serializes the body without its CRC.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.push(self.msg_id);
        bytes.push(self.sub_id);
        bytes.push(self.msg_type.code());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Validates a received body and its CRC.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Checksum`] for a bad CRC and [`CommError::Parsing`] if the body
    /// is too short or has an unknown type.
    pub fn parse(bytes: &[u8], crc: u8) -> Result<Self, CommError> {
        check_crc("BODY", bytes, crc)?;
        if bytes.len() < MIN_BODY {
            return Err(CommError::parsing("BODY SIZE"));
        }
        let msg_type = MsgType::from_code(bytes[2]).ok_or_else(|| CommError::parsing("MESSAGE TYPE"))?;
        Ok(Body {
            msg_id: bytes[0],
            sub_id: bytes[1],
            msg_type,
            payload: bytes[MIN_BODY..].to_vec(),
        })
    }

    /// Checks that this received body answers `sent`.
    ///
    /// A [`MsgType::Result`] body is always accepted and its status is checked first,
    /// so device errors surface before any other mismatch.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`CommError::Controller`] if this is a result with a nonzero status.
    /// * [`CommError::Protocol`] if the message id, sub id or type doesn't match.
    pub fn check_reply_to(&self, sent: &Body) -> Result<(), CommError> {
        if self.msg_type == MsgType::Result {
            self.check_result()?;
        }
        if self.msg_id != sent.msg_id {
            return Err(CommError::protocol("MESSAGE ID"));
        }
        if self.sub_id != sent.sub_id {
            return Err(CommError::protocol("MESSAGE SUB ID"));
        }
        if self.msg_type != sent.msg_type && self.msg_type != MsgType::Result {
            return Err(CommError::protocol("READ OR WRITE"));
        }
        Ok(())
    }

    /// Checks the status code of a result body.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the body isn't 5 bytes long, or
    /// [`CommError::Controller`] with the device's error text if the status is nonzero.
    pub fn check_result(&self) -> Result<(), CommError> {
        if self.len() != MIN_BODY + 2 {
            return Err(CommError::parsing("RESULT LENGTH"));
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        if code > 0 {
            return Err(CommError::controller(result_text(code)));
        }
        Ok(())
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}'.{} {:?} [{:02X?}]",
            char::from(self.msg_id),
            self.sub_id,
            self.msg_type,
            self.payload
        )
    }
}

/// Serializes a complete packet: header, header CRC, body, body CRC.
///
/// # Examples
///
/// ```
/// use roadlink_core::DropAddress;
/// use roadlink_core::ss125::{encode_packet, Body, Header, MsgType};
///
/// let body = Body::new(b'e', MsgType::Read, vec![]);
/// let header = Header::request(DropAddress(0x0102), 7, body.len());
/// let bytes = encode_packet(&header, &body);
/// assert_eq!(b"Z1\x00\x01\x02\x00\x00\x00\x07\x03", &bytes[..10]);
/// assert_eq!(b"e\x00\x00", &bytes[11..14]);
/// assert_eq!(15, bytes.len());
/// ```
pub fn encode_packet(header: &Header, body: &Body) -> Vec<u8> {
    let head = header.to_bytes();
    let body = body.to_bytes();
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len() + 2);
    bytes.extend_from_slice(&head);
    bytes.push(Crc8.compute(&head));
    bytes.extend_from_slice(&body);
    bytes.push(Crc8.compute(&body));
    bytes
}

fn check_crc(segment: &'static str, bytes: &[u8], crc: u8) -> Result<(), CommError> {
    let expected = Crc8.compute(bytes);
    if expected != crc {
        return Err(CommError::Checksum {
            segment,
            expected: u16::from(expected),
            actual: u16::from(crc),
        });
    }
    Ok(())
}

/// Returns the description of a device result code.
pub fn result_text(code: u16) -> &'static str {
    match code {
        1 => "PAYLOAD SIZE",
        2 => "BODY CRC",
        3 => "READ ONLY",
        15 => "INTERVAL NONEXISTANT",
        16 => "LANE NONEXISTANT",
        17 => "FLASH BUSY (A)",
        19 => "INVALID PUSH STATE",
        20 => "ERROR SETTING RTC",
        21 => "RTC SYNC ERROR",
        22 => "FLASH ERASE ERROR",
        23 => "FLASH BUSY (B)",
        24 => "INVALID PROTOCOL STATE",
        25 => "TOO MANY APPROACHES",
        26 => "TOO MANY LANES",
        30 => "AUTOMATIC LANE",
        31 => "WRONG LANE COUNT",
        33 => "INVALID BAUD RATE",
        _ => "UNKNOWN ERROR",
    }
}
