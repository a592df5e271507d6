//! Operations for SS125 radar vehicle detectors.
//!
//! Each operation keeps its own message sequence number, so operations for different
//! sensors (or links) never share state.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::core::ss125::{self, DataConfig, DateTimeProperty, GeneralConfig, IntervalData, BINNING_INTERVAL};
use crate::core::{CommError, Controller, TimestampWindow, Transport};
use crate::operation::{ConfigGuard, Configure, Op, Operation, Priority, RetryPolicy, Transaction};

const LOG_TARGET: &str = "roadlink::ss125";

/// Largest clock error tolerated before the sensor's clock is set, in milliseconds.
pub const CLOCK_TOLERANCE_MS: i64 = 5000;

/// How old a vehicle event may be before the sensor clock is considered wrong.
pub const EVENT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Acceptable interval stamps: the last three intervals, plus the clock tolerance ahead.
fn binned_window() -> TimestampWindow {
    TimestampWindow::new(
        Duration::from_secs(3 * u64::from(BINNING_INTERVAL)),
        Duration::from_millis(CLOCK_TOLERANCE_MS as u64),
    )
}

fn event_window() -> TimestampWindow {
    TimestampWindow::new(EVENT_MAX_AGE, Duration::ZERO)
}

fn set_clock(transport: &mut dyn Transport, controller: &dyn Controller, seq: &mut u8) -> Result<(), CommError> {
    let clock = DateTimeProperty::new(Utc::now());
    info!(target: LOG_TARGET, "{}: setting {}", controller.name(), clock);
    ss125::store(transport, controller.drop_address(), seq, &clock)
}

/// Phases of [`OpSendSettings`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendSettingsPhase {
    /// Read the general configuration.
    QueryGenConfig,

    /// Store the controller's location and imperial units.
    SendGenConfig(GeneralConfig),

    /// Read the data configuration.
    QueryDataConfig,

    /// Store 30 second circular binning with only the wanted pushes.
    SendDataConfig(DataConfig),

    /// Read the sensor's clock.
    QueryDateTime,

    /// Set the sensor's clock to the host's.
    SendDateTime,
}

/// Downloads settings to an SS125 sensor.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink::ss125::OpSendSettings;
/// use roadlink::{Progress, RetryPolicy};
/// use roadlink_core::DropAddress;
/// use roadlink_testing::{MockController, VirtualLink, VirtualSs125};
///
/// let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(12))));
/// let mut link = VirtualLink::new().with_device(sensor.clone());
/// let controller = Arc::new(MockController::new("ctl_12", DropAddress(12)).with_location("TH 100 @ 50th"));
///
/// let mut op = OpSendSettings::operation(controller, RetryPolicy::Limited(3));
/// while op.step(&mut link).unwrap() == Progress::Continue {}
/// assert_eq!("TH 100 @ 50th", sensor.lock().general().location);
/// assert!(!sensor.lock().general().metric);
/// ```
#[derive(Debug)]
pub struct OpSendSettings {
    controller: Arc<dyn Controller>,
    seq: u8,
}

impl OpSendSettings {
    /// Creates the transaction for `controller`.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        OpSendSettings { controller, seq: 0 }
    }

    /// Creates a queueable operation at download priority.
    pub fn operation(controller: Arc<dyn Controller>, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(Self::new(controller), Priority::Download, retry))
    }
}

impl Transaction for OpSendSettings {
    type Phase = SendSettingsPhase;

    fn name(&self) -> &'static str {
        "SendSettings"
    }

    fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    fn begin(&mut self) -> SendSettingsPhase {
        SendSettingsPhase::QueryGenConfig
    }

    fn poll(
        &mut self,
        phase: SendSettingsPhase,
        transport: &mut dyn Transport,
    ) -> Result<Option<SendSettingsPhase>, CommError> {
        let controller = self.controller.as_ref();
        let drop = controller.drop_address();
        let next = match phase {
            SendSettingsPhase::QueryGenConfig => {
                let mut config = GeneralConfig::default();
                ss125::query(transport, drop, &mut self.seq, &mut config)?;
                controller.set_version_notify(&config.serial_num);
                let location = controller.location();
                if config.needs_update(&location) {
                    config.location = location;
                    config.metric = false;
                    SendSettingsPhase::SendGenConfig(config)
                } else {
                    SendSettingsPhase::QueryDataConfig
                }
            }
            SendSettingsPhase::SendGenConfig(config) => {
                info!(target: LOG_TARGET, "{}: storing {}", controller.name(), config);
                ss125::store(transport, drop, &mut self.seq, &config)?;
                SendSettingsPhase::QueryDataConfig
            }
            SendSettingsPhase::QueryDataConfig => {
                let mut config = DataConfig::default();
                ss125::query(transport, drop, &mut self.seq, &mut config)?;
                let events = controller.wants_vehicle_events();
                if config.needs_update(events) {
                    SendSettingsPhase::SendDataConfig(config.to_polled(events))
                } else {
                    SendSettingsPhase::QueryDateTime
                }
            }
            SendSettingsPhase::SendDataConfig(config) => {
                info!(target: LOG_TARGET, "{}: storing {}", controller.name(), config);
                ss125::store(transport, drop, &mut self.seq, &config)?;
                SendSettingsPhase::QueryDateTime
            }
            SendSettingsPhase::QueryDateTime => {
                let mut clock = DateTimeProperty::default();
                ss125::query(transport, drop, &mut self.seq, &mut clock)?;
                let error = (clock.stamp - Utc::now()).num_milliseconds();
                debug!(target: LOG_TARGET, "{}: {} ({} ms off)", controller.name(), clock, error);
                if error.abs() <= CLOCK_TOLERANCE_MS {
                    return Ok(None);
                }
                SendSettingsPhase::SendDateTime
            }
            SendSettingsPhase::SendDateTime => {
                set_clock(transport, controller, &mut self.seq)?;
                return Ok(None);
            }
        };
        Ok(Some(next))
    }
}

/// Phases of [`OpQueryBinned`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryBinnedPhase {
    /// Read the general configuration to learn the sensor is reachable.
    QueryGenConfig,

    /// Read and store the most recent interval.
    QueryInterval,

    /// Reset the sensor's clock after an out of range interval stamp.
    ClockResync,
}

/// Polls an SS125 sensor for its most recent 30 second interval.
///
/// An interval stamped outside the last few intervals means the sensor's clock is wrong:
/// the samples are discarded and the clock is reset instead.
#[derive(Debug)]
pub struct OpQueryBinned {
    controller: Arc<dyn Controller>,
    seq: u8,
}

impl OpQueryBinned {
    /// Creates the transaction for `controller`.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        OpQueryBinned { controller, seq: 0 }
    }

    /// Creates a queueable operation at poll priority that reads configuration first if needed.
    pub fn operation(controller: Arc<dyn Controller>, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(controller)), Priority::Poll, retry))
    }
}

impl Transaction for OpQueryBinned {
    type Phase = QueryBinnedPhase;

    fn name(&self) -> &'static str {
        "QueryBinned"
    }

    fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    fn begin(&mut self) -> QueryBinnedPhase {
        QueryBinnedPhase::QueryInterval
    }

    fn poll(
        &mut self,
        phase: QueryBinnedPhase,
        transport: &mut dyn Transport,
    ) -> Result<Option<QueryBinnedPhase>, CommError> {
        let controller = self.controller.as_ref();
        let drop = controller.drop_address();
        match phase {
            QueryBinnedPhase::QueryGenConfig => {
                let mut config = GeneralConfig::default();
                ss125::query(transport, drop, &mut self.seq, &mut config)?;
                controller.set_version_notify(&config.serial_num);
                Ok(None)
            }
            QueryBinnedPhase::QueryInterval => {
                let mut interval = IntervalData::new(0);
                ss125::query(transport, drop, &mut self.seq, &mut interval)?;
                let samples = interval
                    .into_samples()
                    .ok_or_else(|| CommError::parsing("Interval data without a header"))?;
                if !binned_window().contains(samples.stamp, Utc::now()) {
                    warn!(target: LOG_TARGET, "{}: bad interval stamp {}", controller.name(), samples.stamp);
                    return Ok(Some(QueryBinnedPhase::ClockResync));
                }
                samples.store(controller, 1);
                Ok(None)
            }
            QueryBinnedPhase::ClockResync => {
                set_clock(transport, controller, &mut self.seq)?;
                Ok(None)
            }
        }
    }
}

impl Configure for OpQueryBinned {
    fn configure(&mut self) -> QueryBinnedPhase {
        QueryBinnedPhase::QueryGenConfig
    }
}

/// Phases of [`OpQueryEvents`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryEventsPhase {
    /// Wait for one pushed vehicle event.
    Listen,

    /// Reset the sensor's clock after an out of range event stamp.
    ClockResync,
}

/// Listens for vehicle events pushed by an SS125 sensor.
///
/// This never finishes: after each event (or quiet timeout) it yields so that other
/// operations on the link can run, and is queued again at idle priority.
#[derive(Debug)]
pub struct OpQueryEvents {
    controller: Arc<dyn Controller>,
    seq: u8,
}

impl OpQueryEvents {
    /// Creates the transaction for `controller`.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        OpQueryEvents { controller, seq: 0 }
    }

    /// Creates a queueable operation at idle priority that retries forever.
    pub fn operation(controller: Arc<dyn Controller>) -> Box<dyn Operation> {
        Box::new(Op::new(Self::new(controller), Priority::Idle, RetryPolicy::Unbounded))
    }
}

impl Transaction for OpQueryEvents {
    type Phase = QueryEventsPhase;

    fn name(&self) -> &'static str {
        "QueryEvents"
    }

    fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    fn begin(&mut self) -> QueryEventsPhase {
        QueryEventsPhase::Listen
    }

    fn poll(
        &mut self,
        phase: QueryEventsPhase,
        transport: &mut dyn Transport,
    ) -> Result<Option<QueryEventsPhase>, CommError> {
        let controller = self.controller.as_ref();
        match phase {
            QueryEventsPhase::Listen => match ss125::receive_event(transport, controller.drop_address())? {
                Some(event) if event_window().contains(event.stamp, Utc::now()) => {
                    debug!(target: LOG_TARGET, "{}: {}", controller.name(), event);
                    controller.log_vehicle_event(&event);
                    Ok(None)
                }
                Some(event) => {
                    warn!(target: LOG_TARGET, "{}: bad event stamp {}", controller.name(), event.stamp);
                    controller.log_comm_gap();
                    Ok(Some(QueryEventsPhase::ClockResync))
                }
                None => Ok(None),
            },
            QueryEventsPhase::ClockResync => {
                set_clock(transport, controller, &mut self.seq)?;
                Ok(None)
            }
        }
    }

    fn is_perpetual(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::core::ss125::LaneInterval;
    use crate::core::{DropAddress, ErrorClass, VehicleEvent};
    use crate::operation::Progress;
    use crate::core::ss125::{encode_packet, Body, Header, MsgType};
    use roadlink_testing::{ControllerCall, MockController, ScriptedTransport, VirtualLink, VirtualSs125};

    fn run(op: &mut dyn Operation, link: &mut dyn Transport) -> Result<Progress, CommError> {
        loop {
            match op.step(link)? {
                Progress::Continue => {}
                progress => return Ok(progress),
            }
        }
    }

    fn lane(lane: u8, volume: u32) -> LaneInterval {
        LaneInterval {
            lane,
            volume,
            speed: Some(61.0),
            occupancy: 8.0,
            classes: [volume.saturating_sub(2), 1, 1],
        }
    }

    fn event(age: chrono::Duration) -> VehicleEvent {
        VehicleEvent {
            stamp: Utc::now() - age,
            lane: 1,
            speed: Some(58.5),
            length: 17.0,
            duration: Duration::from_millis(240),
        }
    }

    #[test]
    fn settings_store_only_what_differs() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(20))));
        let controller = Arc::new(MockController::new("ctl", DropAddress(20)).with_location("I-35W @ 46th"));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let _ = run(OpSendSettings::operation(controller.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        {
            let sensor = sensor.lock();
            assert_eq!("I-35W @ 46th", sensor.general().location);
            assert!(!sensor.data_config().needs_update(false));
            // General and data configuration; the clock was already right.
            assert_eq!(2, sensor.writes());
        }
        assert!(controller.calls().contains(&ControllerCall::Version("SS125-0020".into())));

        let mut link = VirtualLink::new().with_device(sensor.clone());
        let _ = run(OpSendSettings::operation(controller, RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        assert_eq!(2, sensor.lock().writes());
    }

    #[test]
    fn settings_enable_events_for_active_detectors() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(20))));
        sensor.lock().set_clock_offset(chrono::Duration::hours(-3));
        let controller = Arc::new(MockController::new("ctl", DropAddress(20)).with_active_detector(true));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let _ = run(OpSendSettings::operation(controller, RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        let sensor = sensor.lock();
        assert!(sensor.data_config().event_push.enable);
        assert!(sensor.clock_offset().num_milliseconds().abs() < CLOCK_TOLERANCE_MS);
    }

    #[test]
    fn binned_samples_stored() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(21))));
        sensor.lock().set_interval(Utc::now(), vec![lane(0, 12), lane(1, 5)]);
        let controller = Arc::new(MockController::new("ctl", DropAddress(21)));
        let mut link = VirtualLink::new().with_device(sensor).with_chunk_size(4);
        let progress = run(OpQueryBinned::operation(controller.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link);
        assert_eq!(Progress::Done, progress.unwrap());
        let calls = controller.calls();
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::VehCount { counts, class: None, start_pin: 1, .. } if counts == &[Some(12), Some(5)]
        )));
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::Occupancy { scans, .. } if scans == &[Some(80), Some(80)]
        )));
    }

    #[test]
    fn stale_interval_resyncs_clock() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(22))));
        sensor.lock().set_interval(Utc::now() - chrono::Duration::hours(5), vec![lane(0, 3)]);
        let controller = Arc::new(MockController::new("ctl", DropAddress(22)).with_configured(true));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let _ = run(OpQueryBinned::operation(controller.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        assert!(!controller.calls().iter().any(|call| matches!(call, ControllerCall::VehCount { .. })));
        assert_eq!(1, sensor.lock().writes());
    }

    #[test]
    fn missing_interval_is_controller_error() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(23))));
        let controller = Arc::new(MockController::new("ctl", DropAddress(23)).with_configured(true));
        let mut link = VirtualLink::new().with_device(sensor);
        let mut op = OpQueryBinned::new(controller);
        let error = op.poll(QueryBinnedPhase::QueryInterval, &mut link).unwrap_err();
        assert_eq!(ErrorClass::Controller, error.class());
        assert!(error.to_string().contains("INTERVAL NONEXISTANT"));
    }

    #[test]
    fn events_logged_and_op_yields() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(24))));
        sensor.lock().push_event(event(chrono::Duration::seconds(2)));
        let controller = Arc::new(MockController::new("ctl", DropAddress(24)));
        let mut link = VirtualLink::new().with_device(sensor);
        let mut op = OpQueryEvents::operation(controller.clone());
        assert_eq!(Progress::Yield, run(op.as_mut(), &mut link).unwrap());
        assert_eq!(Priority::Idle, op.priority());
        assert!(!op.is_done());
        assert!(matches!(
            controller.calls().as_slice(),
            [ControllerCall::VehicleEvent(event)] if event.lane == 1
        ));
    }

    #[test]
    fn old_event_triggers_clock_resync() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(25))));
        sensor.lock().push_event(event(chrono::Duration::hours(2)));
        sensor.lock().set_clock_offset(chrono::Duration::hours(-2));
        let controller = Arc::new(MockController::new("ctl", DropAddress(25)));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let mut op = OpQueryEvents::new(controller.clone());
        let phase = op.poll(QueryEventsPhase::Listen, &mut link).unwrap();
        assert_eq!(Some(QueryEventsPhase::ClockResync), phase);
        assert_eq!(vec![ControllerCall::CommGap], controller.calls());
        assert_eq!(None, op.poll(QueryEventsPhase::ClockResync, &mut link).unwrap());
        assert!(sensor.lock().clock_offset().num_milliseconds().abs() < CLOCK_TOLERANCE_MS);
    }

    #[test]
    fn quiet_sensor_just_yields() {
        let sensor = Arc::new(Mutex::new(VirtualSs125::new(DropAddress(26))));
        let controller = Arc::new(MockController::new("ctl", DropAddress(26)));
        let mut link = VirtualLink::new()
            .with_device(sensor)
            .with_timeout(Duration::from_millis(20));
        let mut op = OpQueryEvents::new(controller.clone());
        assert_eq!(None, op.poll(QueryEventsPhase::Listen, &mut link).unwrap());
        assert!(controller.calls().is_empty());
    }

    #[test]
    fn stray_packets_do_not_end_listening() {
        let foreign = Header {
            dest_sub: 0,
            dest: DropAddress(0),
            src_sub: 0,
            src: DropAddress(99),
            seq: 0,
            body_len: 0,
        };
        let own = Header {
            src: DropAddress(27),
            ..foreign
        };
        let stray = Body::new(b'x', MsgType::Write, vec![0; 4]);
        let mut link = ScriptedTransport::new()
            .unsolicited(encode_packet(&Header { body_len: stray.len() as u8, ..foreign }, &stray))
            .unsolicited(encode_packet(&Header { body_len: stray.len() as u8, ..own }, &stray))
            .with_timeout(Duration::from_millis(20));
        let controller = Arc::new(MockController::new("ctl", DropAddress(27)));
        let mut op = OpQueryEvents::operation(controller.clone());
        for _ in 0..3 {
            assert_eq!(Progress::Yield, run(op.as_mut(), &mut link).unwrap());
        }
        assert!(!op.is_done());
        assert!(controller.calls().is_empty());
        link.finish().unwrap();
    }
}
