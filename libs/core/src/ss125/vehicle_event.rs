use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::codec;
use crate::errors::CommError;
use crate::record::{VehicleEvent, MAX_LANES};

use super::property::{check_len, Property, MSG_VEHICLE_EVENT};

const OFF_STAMP: usize = 0;
const OFF_LANE: usize = 8;
const OFF_SPEED: usize = 9;
const OFF_LENGTH: usize = 12;
const OFF_DURATION: usize = 14;
const PAYLOAD_LEN: usize = 16;

/// A vehicle event pushed by the sensor.
///
/// Events are never requested; they arrive unsolicited once event push is enabled.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct VehicleEventProperty {
    event: Option<VehicleEvent>,
}

impl VehicleEventProperty {
    /// The decoded event, if any.
    pub fn event(&self) -> Option<&VehicleEvent> {
        self.event.as_ref()
    }

    /// Consumes the property, returning the decoded event.
    pub fn into_event(self) -> Option<VehicleEvent> {
        self.event
    }
}

/// Builds the payload of a pushed vehicle event.
pub fn encode_event(event: &VehicleEvent) -> Result<Vec<u8>, CommError> {
    let mut payload = vec![0u8; PAYLOAD_LEN];
    codec::format_date_time(&mut payload, OFF_STAMP, event.stamp)?;
    codec::format8(&mut payload, OFF_LANE, event.lane)?;
    codec::format24_fixed(&mut payload, OFF_SPEED, event.speed)?;
    codec::format16_fixed(&mut payload, OFF_LENGTH, event.length)?;
    let millis = u16::try_from(event.duration.as_millis()).unwrap_or(u16::MAX);
    codec::format16(&mut payload, OFF_DURATION, millis)?;
    Ok(payload)
}

impl Property for VehicleEventProperty {
    fn msg_id(&self) -> u8 {
        MSG_VEHICLE_EVENT
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("vehicle event", payload, PAYLOAD_LEN)?;
        let lane = codec::parse8(payload, OFF_LANE)?;
        if usize::from(lane) >= MAX_LANES {
            return Err(CommError::parsing(format!("Invalid event lane {}", lane)));
        }
        self.event = Some(VehicleEvent {
            stamp: codec::parse_date_time(payload, OFF_STAMP)?,
            lane,
            speed: codec::parse24_fixed(payload, OFF_SPEED)?,
            length: codec::parse16_fixed(payload, OFF_LENGTH)?,
            duration: Duration::from_millis(u64::from(codec::parse16(payload, OFF_DURATION)?)),
        });
        Ok(())
    }
}

impl Display for VehicleEventProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.event {
            Some(event) => write!(f, "vehicle event: {}", event),
            None => write!(f, "vehicle event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event() -> VehicleEvent {
        VehicleEvent {
            stamp: Utc.with_ymd_and_hms(2024, 3, 10, 17, 45, 2).unwrap(),
            lane: 2,
            speed: Some(63.5),
            length: 21.25,
            duration: Duration::from_millis(180),
        }
    }

    #[test]
    fn decodes_pushed_event() {
        let mut prop = VehicleEventProperty::default();
        prop.decode_payload(&encode_event(&event()).unwrap()).unwrap();
        assert_eq!(Some(&event()), prop.event());
    }

    #[test]
    fn lane_out_of_range_rejected() {
        let mut payload = encode_event(&event()).unwrap();
        payload[OFF_LANE] = 12;
        let mut prop = VehicleEventProperty::default();
        assert!(matches!(prop.decode_payload(&payload), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn read_only() {
        assert!(matches!(
            VehicleEventProperty::default().encode_write(),
            Err(CommError::Protocol { .. })
        ));
    }
}
