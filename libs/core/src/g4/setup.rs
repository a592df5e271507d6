use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::codec;
use crate::controller::DropAddress;
use crate::errors::CommError;

use super::frame::{G4Frame, Qualifier};
use super::stats::BINNING_PERIOD;

const SETUP_LEN: usize = 15;
const OFF_NEW_ID: usize = 0;
const OFF_ZONES: usize = 2;
const OFF_PERIOD: usize = 3;
const OFF_SENSITIVITY: usize = 5;
const OFF_COMP: usize = 6;
const OFF_PORT_1: usize = 7;
const OFF_PORT_2: usize = 9;
const OFF_FLAGS: usize = 11;
const OFF_DATE: usize = 12;

const RTC_LEN: usize = 6;

/// Which optional fields a sensor includes in its statistics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StatComposition(pub u8);

impl StatComposition {
    const GAP: u8 = 0x80;
    const HEADWAY: u8 = 0x40;
    const CLASS_MASK: u8 = 0x3F;

    /// Composition with no gap or headway fields and `classes` vehicle classes (2, 4 or 6).
    pub fn new(classes: usize) -> Self {
        let pattern = match classes {
            4 => 0x38,
            6 => 0x3B,
            _ => 0x08,
        };
        StatComposition(pattern)
    }

    /// Whether gap statistics are included.
    pub fn has_gap(self) -> bool {
        self.0 & Self::GAP != 0
    }

    /// Whether headway statistics are included.
    pub fn has_headway(self) -> bool {
        self.0 & Self::HEADWAY != 0
    }

    /// Number of vehicle classes, or 0 if the class bits are invalid.
    pub fn class_count(self) -> usize {
        match self.0 & Self::CLASS_MASK {
            0x08 => 2,
            0x38 => 4,
            0x3B => 6,
            _ => 0,
        }
    }
}

/// How a sensor reports data on one of its serial ports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PortMode {
    /// Statistics are sent only when requested.
    Polled,

    /// Statistics are pushed at the end of each period.
    Push,

    /// Individual vehicles are pushed.
    PerVehicle,

    /// Unrecognized mode bits.
    Other(u8),
}

/// Configuration of one of a sensor's serial ports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PortConfig(pub u16);

impl PortConfig {
    const BAUD_MASK: u16 = 0x000F;
    const RTS_CTS: u16 = 0x0010;
    const RS4XX: u16 = 0x0020;
    const MODE_SHIFT: u16 = 6;
    const MODE_MASK: u16 = 0x00C0;
    const X3: u16 = 0x0100;
    const HIGH_OCCUPANCY: u16 = 0x0200;

    /// The port's reporting mode.
    pub fn mode(self) -> PortMode {
        match (self.0 & Self::MODE_MASK) >> Self::MODE_SHIFT {
            0 => PortMode::Polled,
            1 => PortMode::Push,
            2 => PortMode::PerVehicle,
            other => PortMode::Other(other as u8),
        }
    }

    /// Whether occupancy is reported in high resolution.
    pub fn is_high_occupancy(self) -> bool {
        self.0 & Self::HIGH_OCCUPANCY != 0
    }

    /// Whether the legacy X3 format is enabled.
    pub fn is_x3(self) -> bool {
        self.0 & Self::X3 != 0
    }

    /// Whether the port is set up for host polling.
    pub fn is_polled_config(self) -> bool {
        !self.is_x3() && self.is_high_occupancy() && self.mode() == PortMode::Polled
    }

    /// Returns a polled, high resolution configuration keeping the physical settings.
    pub fn to_polled(self) -> Self {
        let kept = self.0 & (Self::BAUD_MASK | Self::RTS_CTS | Self::RS4XX);
        PortConfig(kept | Self::HIGH_OCCUPANCY)
    }
}

/// Sensor status flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    const FIFO: u8 = 0x01;
    const STAMP: u8 = 0x20;
    const MPH: u8 = 0x80;

    /// Whether statistics are buffered first-in first-out.
    pub fn is_fifo(self) -> bool {
        self.0 & Self::FIFO != 0
    }

    /// Whether statistics carry a time stamp.
    pub fn is_stamp(self) -> bool {
        self.0 & Self::STAMP != 0
    }

    /// Whether speeds are in miles per hour.
    pub fn is_mph(self) -> bool {
        self.0 & Self::MPH != 0
    }

    /// Returns these flags with FIFO buffering, time stamps and mph speeds enabled.
    pub fn to_polled(self) -> Self {
        StatusFlags(self.0 | Self::FIFO | Self::STAMP | Self::MPH)
    }
}

/// The setup information property, holding a sensor's configuration.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use roadlink_core::DropAddress;
/// use roadlink_core::g4::{PortConfig, SetupInfo, StatComposition, StatusFlags};
///
/// let setup = SetupInfo {
///     new_id: 3,
///     zones: 4,
///     period: 30,
///     sensitivity: 5,
///     comp: StatComposition::new(2),
///     port_1: PortConfig(0x0205),
///     port_2: PortConfig(0x0205),
///     flags: StatusFlags(0xA1),
///     date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
/// };
/// assert!(!setup.needs_update());
///
/// let frame = setup.encode_store(DropAddress(3));
/// assert_eq!(setup, SetupInfo::decode(&frame)?);
/// # Ok::<(), roadlink_core::CommError>(())
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SetupInfo {
    /// Sensor id to switch to.
    pub new_id: u16,

    /// Number of detection zones.
    pub zones: u8,

    /// Statistics period in seconds.
    pub period: u16,

    /// Detection sensitivity.
    pub sensitivity: u8,

    /// Statistics composition.
    pub comp: StatComposition,

    /// Serial port 1 configuration.
    pub port_1: PortConfig,

    /// Serial port 2 configuration.
    pub port_2: PortConfig,

    /// Status flags.
    pub flags: StatusFlags,

    /// Date the configuration was written.
    pub date: NaiveDate,
}

impl SetupInfo {
    /// Builds a query for the setup information of `drop`.
    pub fn encode_query(drop: DropAddress) -> G4Frame {
        G4Frame::new(Qualifier::SetupQuery, drop, Vec::new())
    }

    /// Builds a request storing this setup information in `drop`.
    pub fn encode_store(&self, drop: DropAddress) -> G4Frame {
        let mut data = vec![0u8; SETUP_LEN];
        data[OFF_NEW_ID..OFF_NEW_ID + 2].copy_from_slice(&self.new_id.to_be_bytes());
        data[OFF_ZONES] = self.zones;
        data[OFF_PERIOD..OFF_PERIOD + 2].copy_from_slice(&self.period.to_be_bytes());
        data[OFF_SENSITIVITY] = self.sensitivity;
        data[OFF_COMP] = self.comp.0;
        data[OFF_PORT_1..OFF_PORT_1 + 2].copy_from_slice(&self.port_1.0.to_be_bytes());
        data[OFF_PORT_2..OFF_PORT_2 + 2].copy_from_slice(&self.port_2.0.to_be_bytes());
        data[OFF_FLAGS] = self.flags.0;
        data[OFF_DATE] = self.date.day() as u8;
        data[OFF_DATE + 1] = self.date.month() as u8;
        data[OFF_DATE + 2] = (self.date.year() % 100) as u8;
        G4Frame::new(Qualifier::Setup, drop, data)
    }

    /// Decodes a setup frame.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the frame isn't a setup frame of the right length,
    /// the composition has invalid class bits, or the date is invalid.
    pub fn decode(frame: &G4Frame) -> Result<Self, CommError> {
        let data = &frame.data;
        if frame.qualifier != Qualifier::Setup {
            return Err(CommError::parsing(format!("Expected setup frame, got {}", frame.qualifier)));
        }
        if data.len() != SETUP_LEN {
            return Err(CommError::parsing(format!("Invalid setup length {}", data.len())));
        }
        let comp = StatComposition(data[OFF_COMP]);
        if comp.class_count() == 0 {
            return Err(CommError::parsing(format!("Invalid composition 0x{:02X}", comp.0)));
        }
        let (day, month, year) = (data[OFF_DATE], data[OFF_DATE + 1], data[OFF_DATE + 2]);
        let date = NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day))
            .ok_or_else(|| CommError::parsing(format!("Invalid setup date {}/{}/{}", month, day, year)))?;
        Ok(SetupInfo {
            new_id: codec::parse16(data, OFF_NEW_ID)?,
            zones: data[OFF_ZONES],
            period: codec::parse16(data, OFF_PERIOD)?,
            sensitivity: data[OFF_SENSITIVITY],
            comp,
            port_1: PortConfig(codec::parse16(data, OFF_PORT_1)?),
            port_2: PortConfig(codec::parse16(data, OFF_PORT_2)?),
            flags: StatusFlags(data[OFF_FLAGS]),
            date,
        })
    }

    /// Whether the sensor must be reconfigured to be polled for statistics.
    pub fn needs_update(&self) -> bool {
        let ports_wrong = !self.port_1.is_polled_config() || !self.port_2.is_polled_config();
        let comp_wrong = self.comp.has_gap() || self.comp.has_headway() || self.comp.class_count() != 2;
        let flags_wrong = !self.flags.is_fifo() || !self.flags.is_stamp() || !self.flags.is_mph();
        ports_wrong || self.period != BINNING_PERIOD || comp_wrong || flags_wrong
    }

    /// Returns a copy configured for polling, dated `today`.
    pub fn to_polled(&self, today: NaiveDate) -> Self {
        SetupInfo {
            period: BINNING_PERIOD,
            comp: StatComposition::new(2),
            port_1: self.port_1.to_polled(),
            port_2: self.port_2.to_polled(),
            flags: self.flags.to_polled(),
            date: today,
            ..*self
        }
    }
}

impl Display for SetupInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "setup: id {}, {} zones, period {} s, comp 0x{:02X}, ports 0x{:04X}/0x{:04X}, flags 0x{:02X}, {}",
            self.new_id, self.zones, self.period, self.comp.0, self.port_1.0, self.port_2.0, self.flags.0, self.date
        )
    }
}

/// The real-time clock property.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use roadlink_core::DropAddress;
/// use roadlink_core::g4::Rtc;
///
/// let rtc = Rtc(Utc.with_ymd_and_hms(2024, 11, 5, 13, 45, 7).unwrap());
/// let frame = rtc.encode_store(DropAddress(1));
/// assert_eq!(vec![0x07, 0x45, 0x13, 0x05, 0x11, 0x24], frame.data);
/// assert_eq!(rtc, Rtc::decode(&frame)?);
/// # Ok::<(), roadlink_core::CommError>(())
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rtc(pub DateTime<Utc>);

impl Rtc {
    /// Builds a query for the clock of `drop`.
    pub fn encode_query(drop: DropAddress) -> G4Frame {
        G4Frame::new(Qualifier::RtcQuery, drop, Vec::new())
    }

    /// Builds a request setting the clock of `drop`.
    pub fn encode_store(&self, drop: DropAddress) -> G4Frame {
        let t = self.0;
        // Every field is below 100, so conversion can't fail.
        let bcd = |v: u32| codec::to_bcd(v as u8).unwrap_or(0);
        let data = vec![
            bcd(t.second()),
            bcd(t.minute()),
            bcd(t.hour()),
            bcd(t.day()),
            bcd(t.month()),
            bcd(t.year().rem_euclid(100) as u32),
        ];
        G4Frame::new(Qualifier::Rtc, drop, data)
    }

    /// Decodes a clock frame.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the frame isn't a clock frame of the right length
    /// or doesn't hold a valid time, or [`CommError::Codec`] for invalid BCD digits.
    pub fn decode(frame: &G4Frame) -> Result<Self, CommError> {
        if frame.qualifier != Qualifier::Rtc {
            return Err(CommError::parsing(format!("Expected RTC frame, got {}", frame.qualifier)));
        }
        if frame.data.len() != RTC_LEN {
            return Err(CommError::parsing(format!("Invalid RTC length {}", frame.data.len())));
        }
        let mut f = [0u32; RTC_LEN];
        for (field, &b) in f.iter_mut().zip(&frame.data) {
            *field = u32::from(codec::from_bcd(b)?);
        }
        let [second, minute, hour, day, month, year] = f;
        Utc.with_ymd_and_hms(2000 + year as i32, month, day, hour, minute, second)
            .single()
            .map(Rtc)
            .ok_or_else(|| CommError::parsing(format!("Invalid RTC time {:02X?}", frame.data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn polled_setup() -> SetupInfo {
        SetupInfo {
            new_id: 9,
            zones: 2,
            period: 30,
            sensitivity: 1,
            comp: StatComposition::new(2),
            port_1: PortConfig(0x0203),
            port_2: PortConfig(0x0213),
            flags: StatusFlags(0xA1),
            date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        }
    }

    #[test_case(|s: &mut SetupInfo| s.period = 60 ; "period")]
    #[test_case(|s: &mut SetupInfo| s.comp = StatComposition(0x88) ; "gap included")]
    #[test_case(|s: &mut SetupInfo| s.comp = StatComposition::new(4) ; "four classes")]
    #[test_case(|s: &mut SetupInfo| s.port_1 = PortConfig(0x0243) ; "push mode")]
    #[test_case(|s: &mut SetupInfo| s.port_2 = PortConfig(0x0313) ; "x3")]
    #[test_case(|s: &mut SetupInfo| s.port_2 = PortConfig(0x0013) ; "low occupancy")]
    #[test_case(|s: &mut SetupInfo| s.flags = StatusFlags(0x21) ; "kph")]
    fn wrong_setup_needs_update(change: fn(&mut SetupInfo)) {
        let mut setup = polled_setup();
        assert!(!setup.needs_update());
        change(&mut setup);
        assert!(setup.needs_update());

        let today = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let fixed = setup.to_polled(today);
        assert!(!fixed.needs_update());
        assert_eq!(today, fixed.date);
        assert_eq!(setup.new_id, fixed.new_id);
    }

    #[test]
    fn to_polled_keeps_physical_port_settings() {
        assert_eq!(PortConfig(0x0235), PortConfig(0x0175).to_polled());
    }

    #[test]
    fn setup_wire_layout() {
        let frame = polled_setup().encode_store(DropAddress(9));
        assert_eq!(
            vec![0x00, 0x09, 0x02, 0x00, 0x1E, 0x01, 0x08, 0x02, 0x03, 0x02, 0x13, 0xA1, 31, 12, 23],
            frame.data
        );
    }

    #[test]
    fn short_setup_rejected() {
        let frame = G4Frame::new(Qualifier::Setup, DropAddress(1), vec![0; 14]);
        assert!(matches!(SetupInfo::decode(&frame), Err(CommError::Parsing { .. })));
    }

    #[test]
    fn invalid_rtc_rejected() {
        let bad_digit = G4Frame::new(Qualifier::Rtc, DropAddress(1), vec![0x0A, 0, 0, 1, 1, 0x24]);
        assert!(matches!(Rtc::decode(&bad_digit), Err(CommError::Codec { .. })));

        let bad_month = G4Frame::new(Qualifier::Rtc, DropAddress(1), vec![0, 0, 0, 1, 0x13, 0x24]);
        assert!(matches!(Rtc::decode(&bad_month), Err(CommError::Parsing { .. })));
    }
}
