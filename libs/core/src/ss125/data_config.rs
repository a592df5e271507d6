use std::fmt::{self, Display, Formatter};

use crate::codec;
use crate::controller::DropAddress;
use crate::errors::CommError;

use super::property::{check_len, Property, MSG_DATA_CONFIG};

/// Binning interval, in seconds, the poller configures sensors for.
pub const BINNING_INTERVAL: u16 = 30;

const OFF_INTERVAL: usize = 0;
const OFF_MODE: usize = 2;
const OFF_EVENT_PUSH: usize = 3;
const OFF_INTERVAL_PUSH: usize = OFF_EVENT_PUSH + PUSH_LEN;
const OFF_PRESENCE_PUSH: usize = OFF_INTERVAL_PUSH + PUSH_LEN;
const OFF_SEPARATION: usize = OFF_PRESENCE_PUSH + PUSH_LEN;
const OFF_SIZE: usize = OFF_SEPARATION + 2;
const PAYLOAD_LEN: usize = OFF_SIZE + 2;
const PUSH_LEN: usize = 6;

/// How the sensor stores interval data once its memory is full.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// Overwrite the oldest intervals.
    Circular,

    /// Stop storing.
    Fill,

    /// Unrecognized mode code.
    Other(u8),
}

impl StorageMode {
    fn code(self) -> u8 {
        match self {
            StorageMode::Circular => 0,
            StorageMode::Fill => 1,
            StorageMode::Other(code) => code,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => StorageMode::Circular,
            1 => StorageMode::Fill,
            other => StorageMode::Other(other),
        }
    }
}

/// Settings for pushing one kind of data without being polled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct PushConfig {
    /// Whether pushing is enabled.
    pub enable: bool,

    /// Serial port to push on.
    pub port: u8,

    /// Protocol to push with.
    pub protocol: u8,

    /// Destination sub id.
    pub dest_sub: u8,

    /// Destination address.
    pub dest: DropAddress,
}

impl PushConfig {
    fn encode(&self, payload: &mut [u8], pos: usize) -> Result<(), CommError> {
        codec::format_bool(payload, pos, self.enable)?;
        codec::format8(payload, pos + 1, self.port)?;
        codec::format8(payload, pos + 2, self.protocol)?;
        codec::format8(payload, pos + 3, self.dest_sub)?;
        codec::format16(payload, pos + 4, self.dest.0)?;
        Ok(())
    }

    fn decode(payload: &[u8], pos: usize) -> Result<Self, CommError> {
        Ok(PushConfig {
            enable: codec::parse_bool(payload, pos)?,
            port: codec::parse8(payload, pos + 1)?,
            protocol: codec::parse8(payload, pos + 2)?,
            dest_sub: codec::parse8(payload, pos + 3)?,
            dest: DropAddress(codec::parse16(payload, pos + 4)?),
        })
    }
}

impl Display for PushConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.enable {
            write!(
                f,
                "port {} protocol {} to {:04X}.{}",
                self.port, self.protocol, self.dest, self.dest_sub
            )
        } else {
            write!(f, "off")
        }
    }
}

/// Interval storage and data push settings.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DataConfig {
    /// Binning interval in seconds.
    pub interval: u16,

    /// Storage mode.
    pub mode: StorageMode,

    /// Vehicle event push settings.
    pub event_push: PushConfig,

    /// Interval data push settings.
    pub interval_push: PushConfig,

    /// Presence push settings.
    pub presence_push: PushConfig,

    /// Default vehicle separation.
    pub default_separation: f32,

    /// Default vehicle size.
    pub default_size: f32,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            interval: 0,
            mode: StorageMode::Circular,
            event_push: PushConfig::default(),
            interval_push: PushConfig::default(),
            presence_push: PushConfig::default(),
            default_separation: 0.0,
            default_size: 0.0,
        }
    }
}

impl DataConfig {
    /// Whether the sensor must be updated for polling, given whether vehicle events are wanted.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::ss125::DataConfig;
    ///
    /// let config = DataConfig::default();
    /// assert!(config.needs_update(false));
    /// assert!(!config.to_polled(false).needs_update(false));
    /// ```
    pub fn needs_update(&self, events: bool) -> bool {
        self.interval != BINNING_INTERVAL
            || self.mode != StorageMode::Circular
            || self.event_push.enable != events
            || self.interval_push.enable
            || self.presence_push.enable
    }

    /// Returns a copy set to 30-second circular storage with only the wanted pushes enabled.
    pub fn to_polled(&self, events: bool) -> Self {
        let mut config = *self;
        config.interval = BINNING_INTERVAL;
        config.mode = StorageMode::Circular;
        config.event_push.enable = events;
        config.interval_push.enable = false;
        config.presence_push.enable = false;
        config
    }
}

impl Property for DataConfig {
    fn msg_id(&self) -> u8 {
        MSG_DATA_CONFIG
    }

    fn encode_write(&self) -> Result<Vec<u8>, CommError> {
        let mut payload = vec![0u8; PAYLOAD_LEN];
        codec::format16(&mut payload, OFF_INTERVAL, self.interval)?;
        codec::format8(&mut payload, OFF_MODE, self.mode.code())?;
        self.event_push.encode(&mut payload, OFF_EVENT_PUSH)?;
        self.interval_push.encode(&mut payload, OFF_INTERVAL_PUSH)?;
        self.presence_push.encode(&mut payload, OFF_PRESENCE_PUSH)?;
        codec::format16_fixed(&mut payload, OFF_SEPARATION, self.default_separation)?;
        codec::format16_fixed(&mut payload, OFF_SIZE, self.default_size)?;
        Ok(payload)
    }

    fn decode_payload(&mut self, payload: &[u8]) -> Result<(), CommError> {
        check_len("data config", payload, PAYLOAD_LEN)?;
        self.interval = codec::parse16(payload, OFF_INTERVAL)?;
        self.mode = StorageMode::from_code(codec::parse8(payload, OFF_MODE)?);
        self.event_push = PushConfig::decode(payload, OFF_EVENT_PUSH)?;
        self.interval_push = PushConfig::decode(payload, OFF_INTERVAL_PUSH)?;
        self.presence_push = PushConfig::decode(payload, OFF_PRESENCE_PUSH)?;
        self.default_separation = codec::parse16_fixed(payload, OFF_SEPARATION)?;
        self.default_size = codec::parse16_fixed(payload, OFF_SIZE)?;
        Ok(())
    }
}

impl Display for DataConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data config: interval {} s, mode {:?}, event push {}, interval push {}, presence push {}, \
             separation {}, size {}",
            self.interval,
            self.mode,
            self.event_push,
            self.interval_push,
            self.presence_push,
            self.default_separation,
            self.default_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polled() -> DataConfig {
        DataConfig {
            interval: 30,
            mode: StorageMode::Circular,
            default_separation: 20.5,
            default_size: 18.25,
            ..DataConfig::default()
        }
    }

    #[test]
    fn round_trip_preserves_push_destinations() {
        let config = DataConfig {
            event_push: PushConfig {
                enable: true,
                port: 2,
                protocol: 1,
                dest_sub: 0,
                dest: DropAddress(0xBEEF),
            },
            ..polled()
        };
        let payload = config.encode_write().unwrap();
        assert_eq!(PAYLOAD_LEN, payload.len());
        assert_eq!([1, 2, 1, 0, 0xBE, 0xEF], payload[OFF_EVENT_PUSH..OFF_EVENT_PUSH + PUSH_LEN]);

        let mut decoded = DataConfig::default();
        decoded.decode_payload(&payload).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn event_push_follows_preference() {
        let config = polled();
        assert!(!config.needs_update(false));
        assert!(config.needs_update(true));

        let with_events = config.to_polled(true);
        assert!(with_events.event_push.enable);
        assert!(!with_events.needs_update(true));
    }

    #[test]
    fn fill_mode_needs_update() {
        let config = DataConfig {
            mode: StorageMode::Fill,
            ..polled()
        };
        assert!(config.needs_update(false));
        assert_eq!(StorageMode::Circular, config.to_polled(false).mode);
    }

    #[test]
    fn interval_push_needs_update() {
        let mut config = polled();
        config.interval_push.enable = true;
        assert!(config.needs_update(false));
        assert!(!config.to_polled(false).interval_push.enable);
    }
}
