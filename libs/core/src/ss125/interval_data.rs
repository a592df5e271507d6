use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use crate::codec;
use crate::errors::CommError;
use crate::record::{LaneSamples, VehClass, MAX_LANES, MAX_SCANS};

use super::data_config::BINNING_INTERVAL;
use super::property::{check_len, Property, MSG_INTERVAL_DATA};
use super::LOG_TARGET;

/// Length classes reported explicitly for each lane; class 0 is derived.
const REPORTED_CLASSES: usize = 3;

const HEADER_LEN: usize = 10;
const OFF_STAMP: usize = 0;
const OFF_APPROACHES: usize = 8;
const OFF_LANES: usize = 9;

const LANE_LEN: usize = 9 + 3 * REPORTED_CLASSES;
const OFF_LANE: usize = 0;
const OFF_VOLUME: usize = 1;
const OFF_SPEED: usize = 4;
const OFF_OCCUPANCY: usize = 7;
const OFF_CLASSES: usize = 9;

/// Binned data for one interval, read as a multi-packet response.
///
/// The first packet carries the interval stamp and the approach and lane counts. It is
/// followed by one packet per approach and then one per lane.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntervalData {
    interval: u16,
    approaches: usize,
    lanes: usize,
    packets: usize,
    samples: Option<LaneSamples>,
}

impl IntervalData {
    /// Creates a request for interval number `interval`, where 0 is the most recent.
    pub fn new(interval: u16) -> Self {
        IntervalData {
            interval,
            ..IntervalData::default()
        }
    }

    /// End of the interval, once the first packet has been decoded.
    pub fn stamp(&self) -> Option<DateTime<Utc>> {
        self.samples.as_ref().map(|s| s.stamp)
    }

    /// The decoded samples, once the first packet has been decoded.
    pub fn samples(&self) -> Option<&LaneSamples> {
        self.samples.as_ref()
    }

    /// Consumes the property, returning the decoded samples.
    pub fn into_samples(self) -> Option<LaneSamples> {
        self.samples
    }

    fn decode_header(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("interval header", payload, HEADER_LEN)?;
        let stamp = codec::parse_date_time(payload, OFF_STAMP)?;
        self.approaches = usize::from(codec::parse8(payload, OFF_APPROACHES)?);
        self.lanes = usize::from(codec::parse8(payload, OFF_LANES)?);
        if self.lanes > MAX_LANES {
            return Err(CommError::parsing(format!("Invalid lane count {}", self.lanes)));
        }
        self.samples = Some(LaneSamples::new(
            stamp,
            Duration::from_secs(u64::from(BINNING_INTERVAL)),
            self.lanes,
            REPORTED_CLASSES + 1,
        ));
        Ok(())
    }

    fn decode_lane(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("interval lane", payload, LANE_LEN)?;
        let lane = usize::from(codec::parse8(payload, OFF_LANE)?);
        let samples = self
            .samples
            .as_mut()
            .ok_or_else(|| CommError::parsing("Lane packet before interval header"))?;
        if lane >= samples.lane_count() {
            return Err(CommError::parsing(format!("LANE {} NONEXISTENT", lane)));
        }
        samples.volume[lane] = Some(codec::parse24(payload, OFF_VOLUME)?);
        samples.speed[lane] = codec::parse24_fixed(payload, OFF_SPEED)?
            .filter(|speed| *speed >= 0.0)
            .map(|speed| speed.round() as u32);
        let occupancy = codec::parse16_fixed(payload, OFF_OCCUPANCY)?;
        if occupancy > 100.0 {
            return Err(CommError::parsing(format!("Invalid occupancy {}", occupancy)));
        }
        samples.scans[lane] = Some((occupancy * MAX_SCANS as f32 / 100.0).round() as u32);
        for class in 0..REPORTED_CLASSES {
            let count = codec::parse24(payload, OFF_CLASSES + 3 * class)?;
            samples.classes.set(VehClass(class as u8 + 1), lane, count);
        }
        Ok(())
    }
}

impl Property for IntervalData {
    fn msg_id(&self) -> u8 {
        MSG_INTERVAL_DATA
    }

    fn encode_read(&self) -> Result<Vec<u8>, CommError> {
        Ok(self.interval.to_be_bytes().to_vec())
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError> {
        if self.packets == 0 {
            self.decode_header(payload)?;
        } else if self.packets <= self.approaches {
            // Per-approach totals duplicate the lane data.
            debug!(target: LOG_TARGET, "Skipping approach packet {}", self.packets);
        } else {
            self.decode_lane(payload)?;
        }
        self.packets += 1;
        if self.is_complete() {
            if let Some(samples) = self.samples.as_mut() {
                let volume = samples.volume.clone();
                samples.classes.derive_smallest(&volume);
            }
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.packets > 0 && self.packets == 1 + self.approaches + self.lanes
    }
}

impl Display for IntervalData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "interval data #{}", self.interval)?;
        if let Some(samples) = &self.samples {
            write!(
                f,
                ": {} approaches, {} lanes at {}",
                self.approaches,
                samples.lane_count(),
                samples.stamp.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        Ok(())
    }
}

/// Builds the payload of an interval data header packet.
pub fn encode_interval_header(stamp: DateTime<Utc>, approaches: u8, lanes: u8) -> Result<Vec<u8>, CommError> {
    let mut payload = vec![0u8; HEADER_LEN];
    codec::format_date_time(&mut payload, OFF_STAMP, stamp)?;
    codec::format8(&mut payload, OFF_APPROACHES, approaches)?;
    codec::format8(&mut payload, OFF_LANES, lanes)?;
    Ok(payload)
}

/// Measurements for one lane of an interval, as carried by a lane packet.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LaneInterval {
    /// Zero-based lane number.
    pub lane: u8,

    /// Vehicle count.
    pub volume: u32,

    /// Average speed, if measured.
    pub speed: Option<f32>,

    /// Occupancy percentage.
    pub occupancy: f32,

    /// Counts for length classes 1 through 3.
    pub classes: [u32; REPORTED_CLASSES],
}

impl LaneInterval {
    /// Builds the payload of a lane packet.
    pub fn encode(&self) -> Result<Vec<u8>, CommError> {
        let mut payload = vec![0u8; LANE_LEN];
        codec::format8(&mut payload, OFF_LANE, self.lane)?;
        codec::format24(&mut payload, OFF_VOLUME, self.volume)?;
        codec::format24_fixed(&mut payload, OFF_SPEED, self.speed)?;
        codec::format16_fixed(&mut payload, OFF_OCCUPANCY, self.occupancy)?;
        for (i, count) in self.classes.iter().enumerate() {
            codec::format24(&mut payload, OFF_CLASSES + 3 * i, *count)?;
        }
        Ok(payload)
    }
}
