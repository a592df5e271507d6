use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};

use crate::codec;
use crate::errors::CommError;

use super::property::{check_len, Property, MSG_DATE_TIME};

const STAMP_LEN: usize = 8;

/// The sensor's real-time clock.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use roadlink_core::ss125::{DateTimeProperty, Property};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let stamp = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap();
/// let payload = DateTimeProperty::new(stamp).encode_write()?;
///
/// let mut clock = DateTimeProperty::default();
/// clock.decode_payload(&payload)?;
/// assert_eq!(stamp, clock.stamp);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct DateTimeProperty {
    /// The clock value.
    pub stamp: DateTime<Utc>,
}

impl DateTimeProperty {
    /// Creates a property holding `stamp`.
    pub fn new(stamp: DateTime<Utc>) -> Self {
        DateTimeProperty { stamp }
    }
}

impl Property for DateTimeProperty {
    fn msg_id(&self) -> u8 {
        MSG_DATE_TIME
    }

    fn encode_write(&self) -> Result<Vec<u8>, CommError> {
        let mut payload = vec![0u8; STAMP_LEN];
        codec::format_date_time(&mut payload, 0, self.stamp)?;
        Ok(payload)
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("date/time", payload, STAMP_LEN)?;
        self.stamp = codec::parse_date_time(payload, 0)?;
        Ok(())
    }
}

impl Display for DateTimeProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "date/time: {}", self.stamp.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}
