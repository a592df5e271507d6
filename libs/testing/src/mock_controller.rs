use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;

use roadlink_core::{Controller, DropAddress, MessageStatus, SignConfig, SignDevice, VehClass, VehicleEvent};

/// One call made on a [`MockController`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCall {
    /// `set_configured`.
    SetConfigured(bool),

    /// `request_configure`.
    RequestConfigure,

    /// `set_version_notify`.
    Version(String),

    /// `set_error_status`.
    ErrorStatus(String),

    /// `set_comm_failed`.
    CommFailed(bool),

    /// `log_comm_gap`.
    CommGap,

    /// `store_veh_count`.
    VehCount {
        /// Sample time.
        stamp: DateTime<Utc>,
        /// Sample period in seconds.
        period: u32,
        /// First lane's pin.
        start_pin: u32,
        /// Per-lane counts.
        counts: Vec<Option<u32>>,
        /// Vehicle class, `None` for all vehicles.
        class: Option<VehClass>,
    },

    /// `store_occupancy`.
    Occupancy {
        /// Sample time.
        stamp: DateTime<Utc>,
        /// Sample period in seconds.
        period: u32,
        /// First lane's pin.
        start_pin: u32,
        /// Per-lane scan counts.
        scans: Vec<Option<u32>>,
        /// Scans meaning 100% occupancy.
        max_scans: u32,
    },

    /// `store_speed`.
    Speed {
        /// Sample time.
        stamp: DateTime<Utc>,
        /// Sample period in seconds.
        period: u32,
        /// First lane's pin.
        start_pin: u32,
        /// Per-lane speeds.
        speeds: Vec<Option<u32>>,
    },

    /// `log_vehicle_event`.
    VehicleEvent(VehicleEvent),

    /// `set_sign_config`.
    SignConfig(SignConfig),

    /// `set_message_status`.
    MessageStatus(MessageStatus),

    /// `clear_pending_command`.
    ClearPendingCommand,
}

#[derive(Debug)]
struct State {
    configured: bool,
    calls: Vec<ControllerCall>,
}

/// A [`Controller`] and [`SignDevice`] that records every call made on it.
///
/// # Examples
///
/// ```
/// use roadlink_core::{Controller, DropAddress};
/// use roadlink_testing::{ControllerCall, MockController};
///
/// let controller = MockController::new("ctl_7", DropAddress(7)).with_configured(true);
/// controller.set_comm_failed(false);
/// assert!(controller.is_configured());
/// assert_eq!(vec![ControllerCall::CommFailed(false)], controller.calls());
/// ```
#[derive(Debug)]
pub struct MockController {
    name: String,
    drop: DropAddress,
    poll_period: Duration,
    location: String,
    active_detector: bool,
    state: Mutex<State>,
}

impl MockController {
    /// Creates an unconfigured controller with a 30 second poll period and no detectors.
    pub fn new<S: Into<String>>(name: S, drop: DropAddress) -> Self {
        MockController {
            name: name.into(),
            drop,
            poll_period: Duration::from_secs(30),
            location: String::new(),
            active_detector: false,
            state: Mutex::new(State {
                configured: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Sets the location to program into the device.
    pub fn with_location<S: Into<String>>(mut self, location: S) -> Self {
        self.location = location.into();
        self
    }

    /// Sets whether a detector is assigned.
    pub fn with_active_detector(mut self, active: bool) -> Self {
        self.active_detector = active;
        self
    }

    /// Sets whether the configuration is already known.
    pub fn with_configured(self, configured: bool) -> Self {
        self.state.lock().configured = configured;
        self
    }

    /// Sets the poll period.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<ControllerCall> {
        self.state.lock().calls.clone()
    }

    /// Removes and returns the calls made so far.
    pub fn take_calls(&self) -> Vec<ControllerCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// The most recent `set_comm_failed` value, if any.
    pub fn comm_failed(&self) -> Option<bool> {
        self.state.lock().calls.iter().rev().find_map(|call| match call {
            ControllerCall::CommFailed(failed) => Some(*failed),
            _ => None,
        })
    }

    fn record(&self, call: ControllerCall) {
        debug!("{}: {:?}", self.name, call);
        self.state.lock().calls.push(call);
    }
}

impl Controller for MockController {
    fn name(&self) -> &str {
        &self.name
    }

    fn drop_address(&self) -> DropAddress {
        self.drop
    }

    fn poll_period(&self) -> Duration {
        self.poll_period
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn is_configured(&self) -> bool {
        self.state.lock().configured
    }

    fn set_configured(&self, configured: bool) {
        self.state.lock().configured = configured;
        self.record(ControllerCall::SetConfigured(configured));
    }

    fn request_configure(&self) {
        self.state.lock().configured = false;
        self.record(ControllerCall::RequestConfigure);
    }

    fn set_version_notify(&self, version: &str) {
        self.record(ControllerCall::Version(version.into()));
    }

    fn set_error_status(&self, status: &str) {
        self.record(ControllerCall::ErrorStatus(status.into()));
    }

    fn set_comm_failed(&self, failed: bool) {
        self.record(ControllerCall::CommFailed(failed));
    }

    fn log_comm_gap(&self) {
        self.record(ControllerCall::CommGap);
    }

    fn has_active_detector(&self) -> bool {
        self.active_detector
    }

    fn store_veh_count(
        &self,
        stamp: DateTime<Utc>,
        period: u32,
        start_pin: u32,
        counts: &[Option<u32>],
        class: Option<VehClass>,
    ) {
        self.record(ControllerCall::VehCount {
            stamp,
            period,
            start_pin,
            counts: counts.to_vec(),
            class,
        });
    }

    fn store_occupancy(&self, stamp: DateTime<Utc>, period: u32, start_pin: u32, scans: &[Option<u32>], max_scans: u32) {
        self.record(ControllerCall::Occupancy {
            stamp,
            period,
            start_pin,
            scans: scans.to_vec(),
            max_scans,
        });
    }

    fn store_speed(&self, stamp: DateTime<Utc>, period: u32, start_pin: u32, speeds: &[Option<u32>]) {
        self.record(ControllerCall::Speed {
            stamp,
            period,
            start_pin,
            speeds: speeds.to_vec(),
        });
    }

    fn log_vehicle_event(&self, event: &VehicleEvent) {
        self.record(ControllerCall::VehicleEvent(*event));
    }
}

impl SignDevice for MockController {
    fn set_sign_config(&self, config: SignConfig) {
        self.record(ControllerCall::SignConfig(config));
    }

    fn set_message_status(&self, status: MessageStatus) {
        self.record(ControllerCall::MessageStatus(status));
    }

    fn clear_pending_command(&self) {
        self.record(ControllerCall::ClearPendingCommand);
    }
}
