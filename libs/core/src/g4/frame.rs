use std::fmt::{self, Display, Formatter};

use log::warn;

use crate::checksum::{Additive16, Checksum};
use crate::controller::DropAddress;
use crate::errors::CommError;
use crate::record::VehClass;

use super::LOG_TARGET;

/// Two bytes that begin every G4 frame.
pub const LEADER: [u8; 2] = [0xFF, 0xAA];

const QUAL_IDX: usize = 2;
const DATA_LEN_IDX: usize = 3;
const SENSOR_ID_IDX: usize = 4;
const PAYLOAD_IDX: usize = 6;
const HEADER_LEN: usize = 4;
const CHECKSUM_LEN: usize = 2;

/// Declared length of a frame holding only the sensor id, as setup and clock queries do.
const ID_LEN: usize = 2;

/// Smallest declared length of a response frame: the sensor id plus one byte.
const MIN_DATA_LEN: usize = 3;

/// Size of the statistics end frame, which is also the smallest possible response frame.
pub const STATS_END_LEN: usize = HEADER_LEN + MIN_DATA_LEN + CHECKSUM_LEN;

/// The type of a G4 frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// Setup information (store request or query response).
    Setup,

    /// Real-time clock (store request or query response).
    Rtc,

    /// Per-lane vehicle counts.
    Volume,

    /// Per-lane occupancy.
    Occupancy,

    /// Per-lane average speed.
    Speed,

    /// Per-lane counts for one explicitly reported vehicle class (1 through 5).
    Class(u8),

    /// Query for setup information.
    SetupQuery,

    /// Query for the real-time clock.
    RtcQuery,

    /// Request for the latest statistics.
    DataRequest,

    /// First frame of a statistics response.
    StatsHeader,

    /// Last frame of a statistics response.
    StatsEnd,
}

impl Qualifier {
    /// Returns the qualifier for a wire code, or `None` if the code is unknown.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::g4::Qualifier;
    ///
    /// assert_eq!(Some(Qualifier::Class(3)), Qualifier::from_code(0x16));
    /// assert_eq!(None, Qualifier::from_code(0x13));
    /// ```
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Qualifier::Setup),
            0x0E => Some(Qualifier::Rtc),
            0x10 => Some(Qualifier::Volume),
            0x11 => Some(Qualifier::Occupancy),
            0x12 => Some(Qualifier::Speed),
            0x14..=0x18 => Some(Qualifier::Class(code - 0x13)),
            0x41 => Some(Qualifier::SetupQuery),
            0x4E => Some(Qualifier::RtcQuery),
            0x53 => Some(Qualifier::DataRequest),
            0x80 => Some(Qualifier::StatsHeader),
            0x81 => Some(Qualifier::StatsEnd),
            _ => None,
        }
    }

    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            Qualifier::Setup => 0x01,
            Qualifier::Rtc => 0x0E,
            Qualifier::Volume => 0x10,
            Qualifier::Occupancy => 0x11,
            Qualifier::Speed => 0x12,
            Qualifier::Class(n) => 0x13 + n,
            Qualifier::SetupQuery => 0x41,
            Qualifier::RtcQuery => 0x4E,
            Qualifier::DataRequest => 0x53,
            Qualifier::StatsHeader => 0x80,
            Qualifier::StatsEnd => 0x81,
        }
    }

    /// Returns the vehicle class carried by a class frame.
    pub fn class(self) -> Option<VehClass> {
        match self {
            Qualifier::Class(n) => Some(VehClass(n)),
            _ => None,
        }
    }
}

impl Display for Qualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Qualifier::Class(n) => write!(f, "C{}", n),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One checksummed unit of G4 wire data.
///
/// # Examples
///
/// ```
/// use roadlink_core::DropAddress;
/// use roadlink_core::g4::{G4Frame, Qualifier};
///
/// let request = G4Frame::data_request(DropAddress(0x0102));
/// assert_eq!(vec![0xFF, 0xAA, 0x53, 0x03, 0x01, 0x02, 0x00, 0x00, 0x03], request.to_bytes());
///
/// let parsed = G4Frame::from_bytes(&request.to_bytes())?;
/// assert_eq!(Qualifier::DataRequest, parsed.qualifier);
/// # Ok::<(), roadlink_core::CommError>(())
/// ```
///
/// # Format Details
///
/// ```text
/// ┌────┬────┬──────┬───┬────┬────┬────────┬ ┄ ┬────┬────┐
/// │ FF │ AA │ Qual │ N │ Sensor  │ Data 0 │...│ Chksum  │
/// └────┴────┴──────┴───┴────┴────┴────────┴ ┄ ┴────┴────┘
///                       └╌╌╌╌╌╌╌╌ N bytes ╌╌╌╌╌┘
/// ```
///
/// `N` counts the sensor id and the data bytes. The checksum is the 16-bit sum of
/// those `N` bytes, big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct G4Frame {
    /// Frame type.
    pub qualifier: Qualifier,

    /// Address of the sensor the frame is to or from.
    pub sensor_id: DropAddress,

    /// Payload following the sensor id.
    pub data: Vec<u8>,
}

impl G4Frame {
    /// Creates a frame.
    pub fn new(qualifier: Qualifier, sensor_id: DropAddress, data: Vec<u8>) -> Self {
        G4Frame {
            qualifier,
            sensor_id,
            data,
        }
    }

    /// Creates a request for the latest statistics from `sensor_id`.
    pub fn data_request(sensor_id: DropAddress) -> Self {
        G4Frame::new(Qualifier::DataRequest, sensor_id, vec![0x00])
    }

    /// The declared data length `N`.
    pub fn data_len(&self) -> usize {
        ID_LEN + self.data.len()
    }

    /// Serializes the frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data_len() + CHECKSUM_LEN);
        bytes.extend_from_slice(&LEADER);
        bytes.push(self.qualifier.code());
        bytes.push(self.data_len() as u8);
        bytes.extend_from_slice(&self.sensor_id.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        let checksum = Additive16.compute(&bytes[SENSOR_ID_IDX..]);
        bytes.extend_from_slice(&checksum.to_be_bytes());
        bytes
    }

    /// Parses exactly one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if `bytes` isn't a single well-formed frame, or
    /// [`CommError::Checksum`] if the checksum doesn't match.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommError> {
        match scan(bytes, 0)? {
            Some(Scanned::Frame(frame, len)) if len == bytes.len() => Ok(frame),
            _ => Err(CommError::parsing(format!("Invalid G4 frame {:02X?}", bytes))),
        }
    }
}

impl Display for G4Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} sensor {:04X} [{:02X?}]", self.qualifier, self.sensor_id, self.data)
    }
}

enum Scanned {
    Frame(G4Frame, usize),
    Unknown(u8, usize),
}

/// Checks for a complete frame at `i`, returning it and its length.
fn scan(bytes: &[u8], i: usize) -> Result<Option<Scanned>, CommError> {
    let rest = &bytes[i..];
    if rest.len() < HEADER_LEN + ID_LEN + CHECKSUM_LEN || rest[..2] != LEADER {
        return Ok(None);
    }
    let n = usize::from(rest[DATA_LEN_IDX]);
    let len = HEADER_LEN + n + CHECKSUM_LEN;
    if n < ID_LEN || rest.len() < len {
        return Ok(None);
    }
    let qualifier = match Qualifier::from_code(rest[QUAL_IDX]) {
        Some(qualifier) => qualifier,
        None => return Ok(Some(Scanned::Unknown(rest[QUAL_IDX], len))),
    };
    let expected = Additive16.compute(&rest[SENSOR_ID_IDX..HEADER_LEN + n]);
    let actual = u16::from_be_bytes([rest[HEADER_LEN + n], rest[HEADER_LEN + n + 1]]);
    if expected != actual {
        return Err(CommError::Checksum {
            segment: "G4 frame",
            expected,
            actual,
        });
    }
    let sensor_id = DropAddress(u16::from_be_bytes([rest[SENSOR_ID_IDX], rest[SENSOR_ID_IDX + 1]]));
    let data = rest[PAYLOAD_IDX..HEADER_LEN + n].to_vec();
    Ok(Some(Scanned::Frame(G4Frame::new(qualifier, sensor_id, data), len)))
}

/// Splits accumulated response bytes into frames.
///
/// Anything that isn't the start of a complete frame is skipped a byte at a time.
/// A complete frame with an unknown qualifier is skipped whole and logged.
///
/// # Errors
///
/// Returns [`CommError::Checksum`] if a complete frame has a bad checksum.
pub fn subdivide(bytes: &[u8]) -> Result<Vec<G4Frame>, CommError> {
    let mut frames = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match scan(bytes, i)? {
            Some(Scanned::Frame(frame, len)) => {
                frames.push(frame);
                i += len;
            }
            Some(Scanned::Unknown(code, len)) => {
                warn!(target: LOG_TARGET, "Ignoring frame with unknown qualifier 0x{:02X}", code);
                i += len;
            }
            None => i += 1,
        }
    }
    Ok(frames)
}

/// Returns whether the accumulated bytes end with a statistics end frame.
///
/// Only the last few bytes are examined and the checksum isn't verified, so this
/// is cheap enough to call after every read.
pub fn is_read_complete(bytes: &[u8]) -> bool {
    if bytes.len() < STATS_END_LEN {
        return false;
    }
    let tail = &bytes[bytes.len() - STATS_END_LEN..];
    tail[..2] == LEADER && tail[QUAL_IDX] == Qualifier::StatsEnd.code() && usize::from(tail[DATA_LEN_IDX]) == MIN_DATA_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Qualifier::Setup, 0x01 ; "setup")]
    #[test_case(Qualifier::Volume, 0x10 ; "volume")]
    #[test_case(Qualifier::Class(1), 0x14 ; "class 1")]
    #[test_case(Qualifier::Class(5), 0x18 ; "class 5")]
    #[test_case(Qualifier::StatsHeader, 0x80 ; "stats header")]
    #[test_case(Qualifier::StatsEnd, 0x81 ; "stats end")]
    fn qualifier_codes(qualifier: Qualifier, code: u8) {
        assert_eq!(code, qualifier.code());
        assert_eq!(Some(qualifier), Qualifier::from_code(code));
    }

    #[test]
    fn data_request_uses_full_address_bytes() {
        let bytes = G4Frame::data_request(DropAddress(0x12F3)).to_bytes();
        let sum = 0x12u16 + 0xF3;
        assert_eq!(vec![0xFF, 0xAA, 0x53, 0x03, 0x12, 0xF3, 0x00, (sum >> 8) as u8, sum as u8], bytes);
    }

    #[test_case(Qualifier::SetupQuery ; "setup query")]
    #[test_case(Qualifier::RtcQuery ; "rtc query")]
    fn queries_without_data_parse(qualifier: Qualifier) {
        let bytes = G4Frame::new(qualifier, DropAddress(3), Vec::new()).to_bytes();
        assert_eq!(vec![0xFF, 0xAA, qualifier.code(), 0x02, 0x00, 0x03, 0x00, 0x03], bytes);
        let frames = subdivide(&bytes).unwrap();
        assert_eq!(vec![G4Frame::new(qualifier, DropAddress(3), Vec::new())], frames);
        assert!(G4Frame::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn subdivide_skips_noise() {
        let a = G4Frame::new(Qualifier::Volume, DropAddress(7), vec![0, 5]).to_bytes();
        let b = G4Frame::new(Qualifier::StatsEnd, DropAddress(7), vec![1]).to_bytes();
        let mut bytes = vec![0x00, 0xFF, 0x13];
        bytes.extend_from_slice(&a);
        bytes.push(0xAA);
        bytes.extend_from_slice(&b);

        let frames = subdivide(&bytes).unwrap();
        assert_eq!(2, frames.len());
        assert_eq!(Qualifier::Volume, frames[0].qualifier);
        assert_eq!(vec![0, 5], frames[0].data);
        assert_eq!(Qualifier::StatsEnd, frames[1].qualifier);
    }

    #[test]
    fn subdivide_skips_unknown_qualifier() {
        let mut unknown = G4Frame::new(Qualifier::Volume, DropAddress(7), vec![0, 5]).to_bytes();
        unknown[2] = 0x13;
        let end = G4Frame::new(Qualifier::StatsEnd, DropAddress(7), vec![1]).to_bytes();
        unknown.extend_from_slice(&end);
        let frames = subdivide(&unknown).unwrap();
        assert_eq!(1, frames.len());
        assert_eq!(Qualifier::StatsEnd, frames[0].qualifier);
    }

    #[test]
    fn subdivide_ignores_partial_frame() {
        let bytes = G4Frame::new(Qualifier::Volume, DropAddress(7), vec![0, 5, 0, 6]).to_bytes();
        assert!(subdivide(&bytes[..bytes.len() - 1]).unwrap().is_empty());
    }

    #[test]
    fn bad_checksum_detected() {
        let mut bytes = G4Frame::new(Qualifier::Volume, DropAddress(7), vec![0, 5]).to_bytes();
        bytes[7] ^= 0x01;
        let error = subdivide(&bytes).unwrap_err();
        assert!(matches!(error, CommError::Checksum { segment: "G4 frame", .. }));
    }

    #[test]
    fn every_bit_flip_rejected() {
        let good = G4Frame::new(Qualifier::Speed, DropAddress(0x0203), vec![0, 55, 0, 61]).to_bytes();
        // The qualifier isn't covered by the checksum.
        for byte in (0..good.len()).filter(|&i| i != QUAL_IDX) {
            for bit in 0..8 {
                let mut bytes = good.clone();
                bytes[byte] ^= 1 << bit;
                assert!(G4Frame::from_bytes(&bytes).is_err(), "byte {} bit {}", byte, bit);
            }
        }
        assert!(G4Frame::from_bytes(&good).is_ok());
    }

    #[test]
    fn read_complete_only_at_tail() {
        let end = G4Frame::new(Qualifier::StatsEnd, DropAddress(7), vec![1]).to_bytes();
        assert!(is_read_complete(&end));
        let mut longer = end.clone();
        longer.push(0);
        assert!(!is_read_complete(&longer));
        assert!(!is_read_complete(&end[1..]));
    }
}
