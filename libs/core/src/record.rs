use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use derive_more::{Display, LowerHex, UpperHex};

use crate::controller::Controller;

/// Maximum number of lanes (detection zones) a sensor may report.
pub const MAX_LANES: usize = 12;

/// Occupancy is reported as a scan count out of this many scans per sample.
pub const MAX_SCANS: u32 = 1000;

/// Index of a vehicle length class; class 0 is the smallest vehicles.
///
/// # Examples
///
/// ```
/// use roadlink_core::VehClass;
///
/// let class = VehClass(2);
/// assert_eq!("2", class.to_string());
/// assert!(VehClass::SMALLEST < class);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, LowerHex, UpperHex)]
pub struct VehClass(pub u8);

impl VehClass {
    /// The smallest class, which sensors don't transmit directly.
    pub const SMALLEST: VehClass = VehClass(0);
}

/// Units a sensor reports speeds in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SpeedUnits {
    /// Miles per hour.
    Mph,

    /// Kilometers per hour.
    Kph,
}

impl SpeedUnits {
    /// Converts a speed in these units to miles per hour, rounding to the nearest integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::SpeedUnits;
    ///
    /// assert_eq!(55, SpeedUnits::Mph.to_mph(55));
    /// assert_eq!(62, SpeedUnits::Kph.to_mph(100));
    /// ```
    pub fn to_mph(self, speed: u32) -> u32 {
        match self {
            SpeedUnits::Mph => speed,
            SpeedUnits::Kph => (f64::from(speed) * 0.621_371).round() as u32,
        }
    }
}

impl Display for SpeedUnits {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            SpeedUnits::Mph => write!(f, "mph"),
            SpeedUnits::Kph => write!(f, "km/h"),
        }
    }
}

/// Per-lane vehicle counts broken down by length class.
///
/// Explicitly reported classes are stored as received. The smallest class is never
/// transmitted and is derived from the lane totals by [`derive_smallest`](Self::derive_smallest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassTable {
    counts: Vec<Vec<Option<u32>>>,
    lanes: usize,
}

impl ClassTable {
    /// Creates a table of `classes` classes by `lanes` lanes with every count missing.
    pub fn new(classes: usize, lanes: usize) -> Self {
        ClassTable {
            counts: vec![vec![None; lanes]; classes],
            lanes,
        }
    }

    /// Number of classes, including the derived one.
    pub fn class_count(&self) -> usize {
        self.counts.len()
    }

    /// Records a count for one class in one lane. Out of range indices are ignored.
    pub fn set(&mut self, class: VehClass, lane: usize, count: u32) {
        if let Some(slot) = self
            .counts
            .get_mut(usize::from(class.0))
            .and_then(|lanes| lanes.get_mut(lane))
        {
            *slot = Some(count);
        }
    }

    /// Returns the count for one class in one lane, if known.
    pub fn get(&self, class: VehClass, lane: usize) -> Option<u32> {
        self.counts.get(usize::from(class.0))?.get(lane).copied().flatten()
    }

    /// Returns the per-lane counts for one class.
    pub fn lanes(&self, class: VehClass) -> &[Option<u32>] {
        self.counts.get(usize::from(class.0)).map_or(&[], |lanes| lanes.as_slice())
    }

    /// Fills in the smallest class as each lane's total minus the sum of the explicit classes.
    ///
    /// A lane whose total or any explicit class is missing, or whose explicit classes add
    /// up to more than the total, gets a missing count rather than a negative one.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::{ClassTable, VehClass};
    ///
    /// let mut table = ClassTable::new(3, 2);
    /// table.set(VehClass(1), 0, 5);
    /// table.set(VehClass(2), 0, 2);
    /// table.set(VehClass(1), 1, 9);
    /// table.set(VehClass(2), 1, 4);
    /// table.derive_smallest(&[Some(10), Some(12)]);
    ///
    /// assert_eq!(Some(3), table.get(VehClass::SMALLEST, 0));
    /// assert_eq!(None, table.get(VehClass::SMALLEST, 1));
    /// ```
    pub fn derive_smallest(&mut self, totals: &[Option<u32>]) {
        if self.counts.is_empty() {
            return;
        }
        for lane in 0..self.lanes {
            let total = totals.get(lane).copied().flatten();
            let explicit: Option<u32> = self.counts[1..]
                .iter()
                .map(|class| class[lane])
                .sum();
            let derived = match (total, explicit) {
                (Some(total), Some(explicit)) => total.checked_sub(explicit),
                _ => None,
            };
            if let Some(smallest) = self.counts.first_mut() {
                smallest[lane] = derived;
            }
        }
    }
}

/// One binning interval's worth of per-lane samples from a vehicle detector.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneSamples {
    /// End of the sampling interval.
    pub stamp: DateTime<Utc>,

    /// Length of the sampling interval.
    pub period: Duration,

    /// Vehicle counts.
    pub volume: Vec<Option<u32>>,

    /// Occupancy as a count of [`MAX_SCANS`] scans.
    pub scans: Vec<Option<u32>>,

    /// Average speeds in miles per hour.
    pub speed: Vec<Option<u32>>,

    /// Vehicle counts by length class.
    pub classes: ClassTable,
}

impl LaneSamples {
    /// Creates samples for `lanes` lanes and `classes` length classes, with every value missing.
    pub fn new(stamp: DateTime<Utc>, period: Duration, lanes: usize, classes: usize) -> Self {
        LaneSamples {
            stamp,
            period,
            volume: vec![None; lanes],
            scans: vec![None; lanes],
            speed: vec![None; lanes],
            classes: ClassTable::new(classes, lanes),
        }
    }

    /// Number of lanes sampled.
    pub fn lane_count(&self) -> usize {
        self.volume.len()
    }

    /// Hands the samples to `controller`, starting at input pin `start_pin`.
    pub fn store<C: Controller + ?Sized>(&self, controller: &C, start_pin: u32) {
        let period = self.period.as_secs() as u32;
        controller.store_veh_count(self.stamp, period, start_pin, &self.volume, None);
        controller.store_occupancy(self.stamp, period, start_pin, &self.scans, MAX_SCANS);
        controller.store_speed(self.stamp, period, start_pin, &self.speed);
        for class in 0..self.classes.class_count() {
            let class = VehClass(class as u8);
            controller.store_veh_count(self.stamp, period, start_pin, self.classes.lanes(class), Some(class));
        }
    }
}

/// A single vehicle detection reported as it happens.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VehicleEvent {
    /// When the vehicle was detected.
    pub stamp: DateTime<Utc>,

    /// Zero-based lane number.
    pub lane: u8,

    /// Speed in miles per hour, if measured.
    pub speed: Option<f32>,

    /// Vehicle length in feet.
    pub length: f32,

    /// How long the vehicle occupied the detection zone.
    pub duration: Duration,
}

impl Display for VehicleEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "lane {} at {}", self.lane, self.stamp.format("%H:%M:%S%.3f"))?;
        if let Some(speed) = self.speed {
            write!(f, ", {:.1} mph", speed)?;
        }
        write!(f, ", {:.1} ft, {} ms", self.length, self.duration.as_millis())
    }
}

/// Range of acceptable device timestamps relative to the host clock.
///
/// A timestamp outside the window means the device clock has drifted and should be reset.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::Utc;
/// use roadlink_core::TimestampWindow;
///
/// let window = TimestampWindow::new(Duration::from_secs(3600), Duration::ZERO);
/// let now = Utc::now();
/// assert!(window.contains(now - chrono::Duration::minutes(59), now));
/// assert!(!window.contains(now - chrono::Duration::hours(2), now));
/// assert!(!window.contains(now + chrono::Duration::seconds(1), now));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimestampWindow {
    max_age: Duration,
    future: Duration,
}

impl TimestampWindow {
    /// Creates a window accepting stamps up to `max_age` in the past and `future` ahead of now.
    pub fn new(max_age: Duration, future: Duration) -> Self {
        TimestampWindow { max_age, future }
    }

    /// Returns whether `stamp` is acceptable at host time `now`.
    pub fn contains(&self, stamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (
            chrono::Duration::from_std(self.max_age),
            chrono::Duration::from_std(self.future),
        ) {
            (Ok(max_age), Ok(future)) => stamp >= now - max_age && stamp <= now + future,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn derived_class_is_remainder() {
        let mut table = ClassTable::new(2, 1);
        table.set(VehClass(1), 0, 7);
        table.derive_smallest(&[Some(10)]);
        assert_eq!(Some(3), table.get(VehClass::SMALLEST, 0));
    }

    #[test]
    fn derived_class_missing_when_negative() {
        let mut table = ClassTable::new(3, 1);
        table.set(VehClass(1), 0, 6);
        table.set(VehClass(2), 0, 5);
        table.derive_smallest(&[Some(10)]);
        assert_eq!(None, table.get(VehClass::SMALLEST, 0));
    }

    #[test]
    fn derived_class_missing_without_total() {
        let mut table = ClassTable::new(2, 2);
        table.set(VehClass(1), 0, 1);
        table.derive_smallest(&[None, Some(4)]);
        assert_eq!(None, table.get(VehClass::SMALLEST, 0));
        // Lane 1 has no explicit count for class 1.
        assert_eq!(None, table.get(VehClass::SMALLEST, 1));
    }

    #[test]
    fn out_of_range_set_ignored() {
        let mut table = ClassTable::new(2, 2);
        table.set(VehClass(5), 0, 1);
        table.set(VehClass(1), 9, 1);
        assert_eq!(ClassTable::new(2, 2), table);
        assert!(table.lanes(VehClass(5)).is_empty());
    }

    #[test]
    fn window_edges() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = TimestampWindow::new(Duration::from_secs(90), Duration::from_secs(5));
        assert!(window.contains(now, now));
        assert!(window.contains(now - chrono::Duration::seconds(90), now));
        assert!(!window.contains(now - chrono::Duration::seconds(91), now));
        assert!(window.contains(now + chrono::Duration::seconds(5), now));
        assert!(!window.contains(now + chrono::Duration::seconds(6), now));
    }

    #[test]
    fn event_display() {
        let event = VehicleEvent {
            stamp: Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 15).unwrap(),
            lane: 2,
            speed: Some(61.5),
            length: 18.0,
            duration: Duration::from_millis(250),
        };
        assert_eq!("lane 2 at 07:30:15.000, 61.5 mph, 18.0 ft, 250 ms", event.to_string());
    }
}
