use std::fmt::{self, Display, Formatter};

use crate::codec;
use crate::errors::CommError;

use super::property::{check_len, Property, MSG_GENERAL_CONFIG};

const ORIENTATION_LEN: usize = 8;
const LOCATION_LEN: usize = 32;
const DESCRIPTION_LEN: usize = 32;
const SERIAL_LEN: usize = 16;

const OFF_ORIENTATION: usize = 0;
const OFF_LOCATION: usize = OFF_ORIENTATION + ORIENTATION_LEN;
const OFF_DESCRIPTION: usize = OFF_LOCATION + LOCATION_LEN;
const OFF_SERIAL: usize = OFF_DESCRIPTION + DESCRIPTION_LEN;
const OFF_METRIC: usize = OFF_SERIAL + SERIAL_LEN;
const PAYLOAD_LEN: usize = OFF_METRIC + 1;

/// Sensor identification and unit settings.
///
/// # Examples
///
/// ```
/// use roadlink_core::ss125::{GeneralConfig, Property};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let config = GeneralConfig {
///     orientation: "N".into(),
///     location: "I-94 @ Snelling".into(),
///     description: "SB".into(),
///     serial_num: "1234".into(),
///     metric: false,
/// };
/// let mut decoded = GeneralConfig::default();
/// decoded.decode_payload(&config.encode_write()?)?;
/// assert_eq!(config, decoded);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GeneralConfig {
    /// Sensor orientation.
    pub orientation: String,

    /// Location description.
    pub location: String,

    /// Free-form description.
    pub description: String,

    /// Serial number (read only).
    pub serial_num: String,

    /// Whether the sensor reports metric units.
    pub metric: bool,
}

impl GeneralConfig {
    /// Whether the sensor must be updated to match `location` and report imperial units.
    pub fn needs_update(&self, location: &str) -> bool {
        self.metric || self.location != truncate(location, LOCATION_LEN)
    }
}

fn truncate(s: &str, len: usize) -> &str {
    s.get(..len).unwrap_or(s).trim_end()
}

impl Property for GeneralConfig {
    fn msg_id(&self) -> u8 {
        MSG_GENERAL_CONFIG
    }

    fn encode_write(&self) -> Result<Vec<u8>, CommError> {
        let mut payload = vec![0u8; PAYLOAD_LEN];
        codec::format_string(&mut payload, OFF_ORIENTATION, &self.orientation, ORIENTATION_LEN)?;
        codec::format_string(&mut payload, OFF_LOCATION, &self.location, LOCATION_LEN)?;
        codec::format_string(&mut payload, OFF_DESCRIPTION, &self.description, DESCRIPTION_LEN)?;
        codec::format_string(&mut payload, OFF_SERIAL, &self.serial_num, SERIAL_LEN)?;
        codec::format_bool(&mut payload, OFF_METRIC, self.metric)?;
        Ok(payload)
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("general config", payload, PAYLOAD_LEN)?;
        self.orientation = codec::parse_string(payload, OFF_ORIENTATION, ORIENTATION_LEN)?;
        self.location = codec::parse_string(payload, OFF_LOCATION, LOCATION_LEN)?;
        self.description = codec::parse_string(payload, OFF_DESCRIPTION, DESCRIPTION_LEN)?;
        self.serial_num = codec::parse_string(payload, OFF_SERIAL, SERIAL_LEN)?;
        self.metric = codec::parse_bool(payload, OFF_METRIC)?;
        Ok(())
    }
}

impl Display for GeneralConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "general config: orientation {:?}, location {:?}, description {:?}, serial {:?}, metric {}",
            self.orientation, self.location, self.description, self.serial_num, self.metric
        )
    }
}
