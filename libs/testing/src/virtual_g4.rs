use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, info};

use roadlink_core::g4::{
    self, G4Frame, PortConfig, Qualifier, Rtc, SetupInfo, StatComposition, Statistics, StatsHeader, StatusFlags,
    BINNING_PERIOD,
};
use roadlink_core::{DropAddress, LaneSamples, SpeedUnits, VehClass};

use crate::virtual_link::VirtualDevice;

/// A simulated G4 sensor.
///
/// Answers statistics requests with the lane values it was given, and setup and clock
/// queries and stores from its own state. It starts out misconfigured (60 second period)
/// so that a settings download has something to fix.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualG4 {
    id: DropAddress,
    zones: usize,
    msg_num: u8,
    setup: SetupInfo,
    clock_offset: chrono::Duration,
    volume: Vec<Option<u32>>,
    scans: Vec<Option<u32>>,
    speed: Vec<Option<u32>>,
    long: Vec<Option<u32>>,
    corrupt_next: bool,
    data_requests: usize,
}

impl VirtualG4 {
    /// Creates a sensor with `zones` detection zones.
    pub fn new(id: DropAddress, zones: usize) -> Self {
        let setup = SetupInfo {
            new_id: id.0,
            zones: zones as u8,
            period: 60,
            sensitivity: 5,
            comp: StatComposition::new(4),
            port_1: PortConfig(0x0105),
            port_2: PortConfig(0x0105),
            flags: StatusFlags(0x00),
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
        };
        VirtualG4 {
            id,
            zones,
            msg_num: 0,
            setup,
            clock_offset: chrono::Duration::zero(),
            volume: vec![None; zones],
            scans: vec![None; zones],
            speed: vec![None; zones],
            long: vec![None; zones],
            corrupt_next: false,
            data_requests: 0,
        }
    }

    /// Sets the statistics reported for one zone.
    ///
    /// `long` is the count of long vehicles; the rest of `volume` are short.
    pub fn set_lane(&mut self, lane: usize, volume: u32, scans: u32, speed: Option<u32>, long: u32) {
        if lane < self.zones {
            self.volume[lane] = Some(volume);
            self.scans[lane] = Some(scans);
            self.speed[lane] = speed;
            self.long[lane] = Some(long);
        }
    }

    /// Makes the sensor's clock run `offset` ahead of the host's.
    pub fn set_clock_offset(&mut self, offset: chrono::Duration) {
        self.clock_offset = offset;
    }

    /// Corrupts the checksum of the next statistics response.
    pub fn corrupt_next_response(&mut self) {
        self.corrupt_next = true;
    }

    /// Current setup information.
    pub fn setup(&self) -> &SetupInfo {
        &self.setup
    }

    /// How far the sensor's clock is ahead of the host's.
    pub fn clock_offset(&self) -> chrono::Duration {
        self.clock_offset
    }

    /// Number of statistics requests answered.
    pub fn data_requests(&self) -> usize {
        self.data_requests
    }

    fn statistics(&mut self) -> Vec<u8> {
        self.msg_num = self.msg_num.wrapping_add(1);
        self.data_requests += 1;
        let header = StatsHeader {
            sensor_id: self.id,
            msg_num: self.msg_num,
            units: SpeedUnits::Mph,
            zones: self.zones,
            classes: 2,
            period: BINNING_PERIOD,
            voltage: 12.4,
            controller_time: Utc::now(),
        };
        let mut samples = LaneSamples::new(
            header.controller_time,
            Duration::from_secs(u64::from(BINNING_PERIOD)),
            self.zones,
            2,
        );
        samples.volume = self.volume.clone();
        samples.scans = self.scans.clone();
        samples.speed = self.speed.clone();
        for (lane, long) in self.long.iter().enumerate() {
            if let Some(long) = long {
                samples.classes.set(VehClass(1), lane, *long);
            }
        }
        let mut bytes = Statistics { header, samples }.to_bytes();
        if self.corrupt_next {
            self.corrupt_next = false;
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
        }
        bytes
    }
}

impl VirtualDevice for VirtualG4 {
    fn process(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let frames = g4::subdivide(request).ok()?;
        let frame = frames.into_iter().find(|f| f.sensor_id == self.id)?;
        debug!("Vsensor {:04X}: {}", self.id, frame);
        match frame.qualifier {
            Qualifier::DataRequest => Some(self.statistics()),
            Qualifier::SetupQuery => Some(self.setup.encode_store(self.id).to_bytes()),
            Qualifier::Setup => {
                let setup = SetupInfo::decode(&frame).ok()?;
                info!("Vsensor {:04X} stored {}", self.id, setup);
                self.setup = setup;
                Some(frame.to_bytes())
            }
            Qualifier::RtcQuery => Some(Rtc(Utc::now() + self.clock_offset).encode_store(self.id).to_bytes()),
            Qualifier::Rtc => {
                let Rtc(stamp) = Rtc::decode(&frame).ok()?;
                info!("Vsensor {:04X} clock set to {}", self.id, stamp);
                self.clock_offset = stamp - Utc::now();
                Some(G4Frame::new(Qualifier::Rtc, self.id, frame.data).to_bytes())
            }
            _ => None,
        }
    }
}
