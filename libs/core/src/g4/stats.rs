use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::codec;
use crate::controller::DropAddress;
use crate::errors::CommError;
use crate::record::{LaneSamples, SpeedUnits, VehClass, MAX_LANES, MAX_SCANS};

use super::frame::{self, G4Frame, Qualifier};
use super::LOG_TARGET;

/// The only statistics period, in seconds, that the poller accepts.
pub const BINNING_PERIOD: u16 = 30;

const MAX_VOLUME: u32 = 3000;
const UNKNOWN_SPEED: u32 = 240;
const MAX_SPEED_KPH: u32 = 200;
const MAX_SPEED_MPH: u32 = 120;

// Offsets within the header frame's data.
const OFF_MSG_NUM: usize = 0;
const OFF_STATUS: usize = 3;
const OFF_ZONES: usize = 11;
const OFF_CLASSES: usize = 12;
const OFF_PERIOD: usize = 13;
const OFF_VOLTAGE: usize = 15;

/// Contents of the frame that starts a statistics response.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StatsHeader {
    /// Sensor that produced the statistics.
    pub sensor_id: DropAddress,

    /// Message number, repeated in the end frame.
    pub msg_num: u8,

    /// Units of the speed frame.
    pub units: SpeedUnits,

    /// Number of detection zones (lanes).
    pub zones: usize,

    /// Number of vehicle classes, including the derived smallest class.
    pub classes: usize,

    /// Statistics period in seconds.
    pub period: u16,

    /// Supply voltage.
    pub voltage: f32,

    /// Time the statistics were collected.
    pub controller_time: DateTime<Utc>,
}

impl StatsHeader {
    fn decode(frame: &G4Frame) -> Result<Self, CommError> {
        let data = &frame.data;
        let msg_num = codec::parse8(data, OFF_MSG_NUM)?;
        let units = if codec::parse8(data, OFF_STATUS)? & 0x01 == 0 {
            SpeedUnits::Kph
        } else {
            SpeedUnits::Mph
        };
        let zones = usize::from(codec::parse8(data, OFF_ZONES)? & 0x0F);
        if zones > MAX_LANES {
            return Err(CommError::parsing(format!("Invalid zone count {}", zones)));
        }
        let classes = match codec::parse8(data, OFF_CLASSES)? & 0x3F {
            0x08 => 2,
            0x38 => 4,
            0x3B => 6,
            pattern => {
                return Err(CommError::parsing(format!(
                    "Unexpected class bit pattern 0x{:02X}",
                    pattern
                )))
            }
        };
        let period = codec::parse16(data, OFF_PERIOD)?;
        if period != BINNING_PERIOD {
            return Err(CommError::parsing(format!("Invalid period {}", period)));
        }
        let voltage = f32::from(codec::parse8(data, OFF_VOLTAGE)?) * 0.1;

        // The controller time field isn't clearly documented, so the host clock stands in.
        let controller_time = Utc::now();

        Ok(StatsHeader {
            sensor_id: frame.sensor_id,
            msg_num,
            units,
            zones,
            classes,
            period,
            voltage,
            controller_time,
        })
    }

    fn max_speed(&self) -> u32 {
        match self.units {
            SpeedUnits::Kph => MAX_SPEED_KPH,
            SpeedUnits::Mph => MAX_SPEED_MPH,
        }
    }
}

/// A decoded statistics response: header plus one interval of lane samples.
///
/// # Examples
///
/// ```
/// use roadlink_core::DropAddress;
/// use roadlink_core::g4::{G4Frame, Qualifier, Statistics};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let sensor = DropAddress(5);
/// let mut header = vec![0u8; 16];
/// header[0] = 9; // message number
/// header[3] = 0x01; // speeds in mph
/// header[11] = 1; // one zone
/// header[12] = 0x08; // two classes
/// header[14] = 30; // period
///
/// let mut bytes = G4Frame::new(Qualifier::StatsHeader, sensor, header).to_bytes();
/// bytes.extend(G4Frame::new(Qualifier::Volume, sensor, vec![0, 12]).to_bytes());
/// bytes.extend(G4Frame::new(Qualifier::Speed, sensor, vec![0, 58]).to_bytes());
/// bytes.extend(G4Frame::new(Qualifier::StatsEnd, sensor, vec![9]).to_bytes());
///
/// let stats = Statistics::decode(&bytes)?;
/// assert_eq!(vec![Some(12)], stats.samples.volume);
/// assert_eq!(vec![Some(58)], stats.samples.speed);
/// assert_eq!(vec![None], stats.samples.scans);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// The header frame.
    pub header: StatsHeader,

    /// Per-lane samples.
    pub samples: LaneSamples,
}

impl Statistics {
    /// Decodes a complete statistics response.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`CommError::Checksum`] if any frame is corrupt.
    /// * [`CommError::LaneCount`] if a lane frame's length disagrees with the header's zone count.
    /// * [`CommError::Parsing`] if the header or end frame is missing or any field is invalid.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommError> {
        let mut stats: Option<Statistics> = None;
        let mut ended = false;
        for frame in frame::subdivide(bytes)? {
            debug!(target: LOG_TARGET, "Received {}", frame);
            match frame.qualifier {
                Qualifier::StatsHeader => {
                    let header = StatsHeader::decode(&frame)?;
                    info!(
                        target: LOG_TARGET,
                        "Sensor {:04X} msg {}: {} zones, {} classes, {}, {:.1} V",
                        header.sensor_id,
                        header.msg_num,
                        header.zones,
                        header.classes,
                        header.units,
                        header.voltage
                    );
                    let samples = LaneSamples::new(
                        header.controller_time,
                        Duration::from_secs(u64::from(header.period)),
                        header.zones,
                        header.classes,
                    );
                    stats = Some(Statistics { header, samples });
                }
                Qualifier::Volume | Qualifier::Occupancy | Qualifier::Speed | Qualifier::Class(_) => {
                    let stats = stats
                        .as_mut()
                        .ok_or_else(|| CommError::parsing("Lane record before statistics header"))?;
                    stats.decode_lanes(&frame)?;
                }
                Qualifier::StatsEnd => {
                    let stats = stats
                        .as_ref()
                        .ok_or_else(|| CommError::parsing("Statistics end before header"))?;
                    stats.check_sensor(&frame)?;
                    let msg_num = codec::parse8(&frame.data, 0)?;
                    if msg_num != stats.header.msg_num {
                        return Err(CommError::parsing(format!(
                            "Unexpected message number {} in statistics end, expected {}",
                            msg_num, stats.header.msg_num
                        )));
                    }
                    ended = true;
                }
                other => warn!(target: LOG_TARGET, "Ignoring unexpected {} frame", other),
            }
        }

        let mut stats = stats.ok_or_else(|| CommError::parsing("Missing statistics header"))?;
        if !ended {
            return Err(CommError::parsing("Missing statistics end"));
        }
        let volume = stats.samples.volume.clone();
        stats.samples.classes.derive_smallest(&volume);
        Ok(stats)
    }

    /// Encodes the statistics as a sensor would send them: header, lane frames, end frame.
    ///
    /// Speeds are sent in miles per hour since that is how samples hold them. Missing values
    /// are sent as zero, except speeds which use the "unknown" marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = &self.header;
        let mut data = vec![0u8; OFF_VOLTAGE + 1];
        data[OFF_MSG_NUM] = header.msg_num;
        data[OFF_STATUS] = 0x01;
        data[OFF_ZONES] = header.zones as u8;
        data[OFF_CLASSES] = match header.classes {
            4 => 0x38,
            6 => 0x3B,
            _ => 0x08,
        };
        data[OFF_PERIOD..OFF_PERIOD + 2].copy_from_slice(&header.period.to_be_bytes());
        data[OFF_VOLTAGE] = (header.voltage * 10.0).round() as u8;

        let sensor = header.sensor_id;
        let lanes = |values: &[Option<u32>], missing: u32| -> Vec<u8> {
            values
                .iter()
                .flat_map(|v| (v.unwrap_or(missing) as u16).to_be_bytes())
                .collect()
        };
        let mut frames = vec![
            G4Frame::new(Qualifier::StatsHeader, sensor, data),
            G4Frame::new(Qualifier::Volume, sensor, lanes(&self.samples.volume, 0)),
            G4Frame::new(Qualifier::Occupancy, sensor, lanes(&self.samples.scans, 0)),
            G4Frame::new(Qualifier::Speed, sensor, lanes(&self.samples.speed, UNKNOWN_SPEED)),
        ];
        for class in 1..self.samples.classes.class_count() {
            let class = class as u8;
            frames.push(G4Frame::new(
                Qualifier::Class(class),
                sensor,
                lanes(self.samples.classes.lanes(VehClass(class)), 0),
            ));
        }
        frames.push(G4Frame::new(Qualifier::StatsEnd, sensor, vec![header.msg_num]));
        frames.iter().flat_map(G4Frame::to_bytes).collect()
    }

    fn check_sensor(&self, frame: &G4Frame) -> Result<(), CommError> {
        if frame.sensor_id != self.header.sensor_id {
            return Err(CommError::parsing(format!(
                "Unexpected sensor id {:04X} in {} record, expected {:04X}",
                frame.sensor_id, frame.qualifier, self.header.sensor_id
            )));
        }
        Ok(())
    }

    fn decode_lanes(&mut self, frame: &G4Frame) -> Result<(), CommError> {
        self.check_sensor(frame)?;
        let zones = self.header.zones;
        let expected = 2 + 2 * zones;
        if frame.data_len() != expected {
            warn!(
                target: LOG_TARGET,
                "Invalid lane count in {} record: data length {}, expected {}",
                frame.qualifier,
                frame.data_len(),
                expected
            );
            return Err(CommError::LaneCount {
                record: record_name(frame.qualifier),
                expected,
                actual: frame.data_len(),
            });
        }

        for lane in 0..zones {
            let value = u32::from(codec::parse16(&frame.data, 2 * lane)?);
            match frame.qualifier {
                Qualifier::Volume => {
                    if value > MAX_VOLUME {
                        return Err(CommError::parsing(format!("Invalid volume {}", value)));
                    }
                    self.samples.volume[lane] = Some(value);
                }
                Qualifier::Occupancy => {
                    if value > MAX_SCANS {
                        return Err(CommError::parsing(format!("Invalid occupancy {}", value)));
                    }
                    self.samples.scans[lane] = Some(value);
                }
                Qualifier::Speed => {
                    self.samples.speed[lane] = if value == UNKNOWN_SPEED {
                        None
                    } else if value > self.header.max_speed() {
                        return Err(CommError::parsing(format!("Invalid speed {}", value)));
                    } else {
                        Some(self.header.units.to_mph(value))
                    };
                }
                Qualifier::Class(n) => {
                    if usize::from(n) >= self.header.classes {
                        warn!(target: LOG_TARGET, "Ignoring C{} record, only {} classes", n, self.header.classes);
                        return Ok(());
                    }
                    self.samples.classes.set(VehClass(n), lane, value);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn record_name(qualifier: Qualifier) -> &'static str {
    match qualifier {
        Qualifier::Volume => "volume",
        Qualifier::Occupancy => "occupancy",
        Qualifier::Speed => "speed",
        _ => "class",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR: DropAddress = DropAddress(0x0107);

    fn header(zones: u8, classes: u8, status: u8) -> Vec<u8> {
        let mut data = vec![0u8; 16];
        data[OFF_MSG_NUM] = 42;
        data[OFF_STATUS] = status;
        data[OFF_ZONES] = 0xF0 | zones;
        data[OFF_CLASSES] = classes;
        data[OFF_PERIOD + 1] = 30;
        data[OFF_VOLTAGE] = 125;
        data
    }

    fn lanes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn response(frames: &[(Qualifier, Vec<u8>)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(q, data)| G4Frame::new(*q, SENSOR, data.clone()).to_bytes())
            .collect()
    }

    #[test]
    fn full_response() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(2, 0x38, 0x01)),
            (Qualifier::Volume, lanes(&[10, 4])),
            (Qualifier::Occupancy, lanes(&[125, 0])),
            (Qualifier::Speed, lanes(&[62, 240])),
            (Qualifier::Class(1), lanes(&[5, 1])),
            (Qualifier::Class(2), lanes(&[2, 4])),
            (Qualifier::Class(3), lanes(&[0, 0])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        let stats = Statistics::decode(&bytes).unwrap();
        assert_eq!(SENSOR, stats.header.sensor_id);
        assert_eq!(4, stats.header.classes);
        assert!((stats.header.voltage - 12.5).abs() < 0.01);
        assert_eq!(vec![Some(10), Some(4)], stats.samples.volume);
        assert_eq!(vec![Some(125), Some(0)], stats.samples.scans);
        assert_eq!(vec![Some(62), None], stats.samples.speed);
        assert_eq!(Some(3), stats.samples.classes.get(VehClass::SMALLEST, 0));
        // 1 + 4 + 0 > 4
        assert_eq!(None, stats.samples.classes.get(VehClass::SMALLEST, 1));
    }

    #[test]
    fn encoded_statistics_decode_alike() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(2, 0x38, 0x01)),
            (Qualifier::Volume, lanes(&[10, 4])),
            (Qualifier::Speed, lanes(&[62, 240])),
            (Qualifier::Class(1), lanes(&[5, 1])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        let stats = Statistics::decode(&bytes).unwrap();
        let again = Statistics::decode(&stats.to_bytes()).unwrap();
        assert_eq!(stats.samples.speed, again.samples.speed);
        assert_eq!(stats.samples.volume, again.samples.volume);
        assert_eq!(Some(5), again.samples.classes.get(VehClass(1), 0));
        assert_eq!(vec![Some(0), Some(0)], again.samples.scans);
    }

    #[test]
    fn metric_speeds_converted() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(1, 0x08, 0x00)),
            (Qualifier::Speed, lanes(&[100])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        let stats = Statistics::decode(&bytes).unwrap();
        assert_eq!(SpeedUnits::Kph, stats.header.units);
        assert_eq!(vec![Some(62)], stats.samples.speed);
    }

    #[test]
    fn speed_limit_depends_on_units() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(1, 0x08, 0x01)),
            (Qualifier::Speed, lanes(&[150])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        assert!(matches!(Statistics::decode(&bytes), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn lane_count_mismatch() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(2, 0x08, 0x01)),
            (Qualifier::Volume, lanes(&[1, 2, 3])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        let error = Statistics::decode(&bytes).unwrap_err();
        assert!(matches!(
            error,
            CommError::LaneCount {
                record: "volume",
                expected: 6,
                actual: 8
            }
        ));
    }

    #[test]
    fn wrong_period_rejected() {
        let mut data = header(1, 0x08, 0x01);
        data[OFF_PERIOD + 1] = 60;
        let bytes = response(&[(Qualifier::StatsHeader, data), (Qualifier::StatsEnd, vec![42])]);
        assert!(matches!(Statistics::decode(&bytes), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn unknown_class_pattern_rejected() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(1, 0x09, 0x01)),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        assert!(matches!(Statistics::decode(&bytes), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn mismatched_message_number() {
        let bytes = response(&[
            (Qualifier::StatsHeader, header(1, 0x08, 0x01)),
            (Qualifier::StatsEnd, vec![41]),
        ]);
        assert!(matches!(Statistics::decode(&bytes), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn missing_end_rejected() {
        let bytes = response(&[(Qualifier::StatsHeader, header(1, 0x08, 0x01))]);
        assert!(matches!(Statistics::decode(&bytes), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn unexpected_known_frame_ignored() {
        let bytes = response(&[
            (Qualifier::DataRequest, vec![0]),
            (Qualifier::StatsHeader, header(1, 0x08, 0x01)),
            (Qualifier::Volume, lanes(&[3])),
            (Qualifier::StatsEnd, vec![42]),
        ]);
        let stats = Statistics::decode(&bytes).unwrap();
        assert_eq!(vec![Some(3)], stats.samples.volume);
        assert!(frame::is_read_complete(&bytes));
    }
}
