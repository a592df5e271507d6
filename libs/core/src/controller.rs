use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use derive_more::{Display, LowerHex, UpperHex};

use crate::record::{VehClass, VehicleEvent};

/// Address of a device on a shared link.
///
/// # Examples
///
/// ```
/// use roadlink_core::DropAddress;
///
/// let drop = DropAddress(0x0102);
/// assert_eq!([0x01, 0x02], drop.to_be_bytes());
/// assert_eq!("0102", format!("{:04X}", drop));
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Display, LowerHex, UpperHex)]
pub struct DropAddress(pub u16);

impl DropAddress {
    /// Returns the address as big-endian bytes, as it appears on the wire.
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

/// The host-side model of one field controller that operations read from and report to.
///
/// Operations never persist anything themselves; everything they learn flows through
/// these methods. Implementations are shared between the link worker and other threads
/// (e.g. a UI-facing reader), so they take `&self` and must handle their own
/// synchronization. Each call should update state atomically.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use chrono::{DateTime, Utc};
/// use roadlink_core::{Controller, DropAddress, VehClass};
///
/// #[derive(Debug)]
/// struct Quiet;
///
/// impl Controller for Quiet {
///     fn name(&self) -> &str { "ctl_1" }
///     fn drop_address(&self) -> DropAddress { DropAddress(1) }
///     fn poll_period(&self) -> Duration { Duration::from_secs(30) }
///     fn is_configured(&self) -> bool { true }
///     fn set_configured(&self, _configured: bool) {}
///     fn set_comm_failed(&self, _failed: bool) {}
///     fn store_veh_count(&self, _: DateTime<Utc>, _: u32, _: u32, _: &[Option<u32>], _: Option<VehClass>) {}
///     fn store_occupancy(&self, _: DateTime<Utc>, _: u32, _: u32, _: &[Option<u32>], _: u32) {}
///     fn store_speed(&self, _: DateTime<Utc>, _: u32, _: u32, _: &[Option<u32>]) {}
/// }
///
/// let controller = Quiet;
/// assert!(!controller.has_active_detector());
/// ```
pub trait Controller: Send + Sync {
    /// Name used to identify the controller in logs.
    fn name(&self) -> &str;

    /// Address of the device on its link.
    fn drop_address(&self) -> DropAddress;

    /// How often the device should be polled for binned samples.
    fn poll_period(&self) -> Duration;

    /// Location description the device should be programmed with, if any.
    fn location(&self) -> String {
        String::new()
    }

    /// Whether the device configuration has been read since it last changed.
    fn is_configured(&self) -> bool;

    /// Records whether the device configuration is known.
    fn set_configured(&self, configured: bool);

    /// Asks for the configuration to be read again on the next poll.
    fn request_configure(&self) {
        self.set_configured(false);
    }

    /// Records the firmware or protocol version reported by the device.
    fn set_version_notify(&self, _version: &str) {}

    /// Records a device-reported error status; an empty string clears it.
    fn set_error_status(&self, _status: &str) {}

    /// Records whether communication with the device has failed.
    fn set_comm_failed(&self, failed: bool);

    /// Notes that samples were lost, e.g. because the device clock was reset.
    fn log_comm_gap(&self) {}

    /// Whether any detector is assigned to this controller.
    fn has_active_detector(&self) -> bool {
        false
    }

    /// Whether the device should push individual vehicle events.
    fn wants_vehicle_events(&self) -> bool {
        self.has_active_detector()
    }

    /// Stores vehicle counts for consecutive lanes beginning at `start_pin`.
    ///
    /// `class` is `None` for counts of all vehicles.
    fn store_veh_count(
        &self,
        stamp: DateTime<Utc>,
        period: u32,
        start_pin: u32,
        counts: &[Option<u32>],
        class: Option<VehClass>,
    );

    /// Stores occupancy as scan counts out of `max_scans`.
    fn store_occupancy(&self, stamp: DateTime<Utc>, period: u32, start_pin: u32, scans: &[Option<u32>], max_scans: u32);

    /// Stores average speeds in miles per hour.
    fn store_speed(&self, stamp: DateTime<Utc>, period: u32, start_pin: u32, speeds: &[Option<u32>]);

    /// Logs one individually reported vehicle.
    fn log_vehicle_event(&self, _event: &VehicleEvent) {}
}

// Provide a Debug representation so types that contain trait objects can derive Debug.
impl Debug for dyn Controller {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<Controller {}>", self.name())
    }
}

/// Status of the message currently shown by a sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MessageStatus {
    /// MULTI text of the message, empty if the sign is blank.
    pub multi: String,

    /// Owner that activated the message.
    pub owner: String,

    /// Remaining duration in minutes, or `None` for indefinite.
    pub duration: Option<u32>,

    /// Message activation priority.
    pub priority: u8,
}

/// Static configuration reported by a sign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignConfig {
    /// Sign model string.
    pub model: String,

    /// Sign manufacturer.
    pub make: String,

    /// Controller firmware version.
    pub version: String,

    /// Sign type description.
    pub sign_type: String,

    /// Pixel width of the sign.
    pub width_pixels: u32,

    /// Pixel height of the sign.
    pub height_pixels: u32,

    /// Horizontal border in millimeters.
    pub horiz_border_mm: u32,

    /// Vertical border in millimeters.
    pub vert_border_mm: u32,

    /// Horizontal pitch in millimeters.
    pub horiz_pitch_mm: u32,

    /// Vertical pitch in millimeters.
    pub vert_pitch_mm: u32,

    /// Width of a character cell in pixels, 0 for full-matrix signs.
    pub char_width_pixels: u32,

    /// Height of a character cell in pixels, 0 for full-matrix signs.
    pub char_height_pixels: u32,
}

/// A dynamic message sign: a [`Controller`] that also displays messages.
pub trait SignDevice: Controller {
    /// Records the configuration reported by the sign.
    fn set_sign_config(&self, config: SignConfig);

    /// Records the message the sign reports it is displaying.
    fn set_message_status(&self, status: MessageStatus);

    /// Clears the pending command so a new one may be issued.
    fn clear_pending_command(&self);
}

impl Debug for dyn SignDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<SignDevice {}>", self.name())
    }
}
