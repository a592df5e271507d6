//! Operations for G4 vehicle detection sensors.
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};

use crate::core::g4::{self, Qualifier, Rtc, SetupInfo};
use crate::core::{CommError, Controller, Transport};
use crate::operation::{ConfigGuard, Configure, Op, Operation, Priority, RetryPolicy, Transaction};

const LOG_TARGET: &str = "roadlink::g4";

/// Largest clock error tolerated before the sensor's clock is set, in milliseconds.
pub const CLOCK_TOLERANCE_MS: i64 = 5000;

/// Phases of [`OpQueryStats`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryStatsPhase {
    /// Read the setup information to learn the sensor is reachable and configured.
    QuerySetup,

    /// Request and store the latest statistics.
    QueryStats,
}

/// Polls a G4 sensor for its 30 second statistics and stores them on the controller.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink::g4::OpQueryStats;
/// use roadlink::{Progress, RetryPolicy};
/// use roadlink_core::DropAddress;
/// use roadlink_testing::{MockController, VirtualG4, VirtualLink};
///
/// let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(4), 2)));
/// sensor.lock().set_lane(1, 12, 150, Some(64), 2);
/// let mut link = VirtualLink::new().with_device(sensor);
///
/// let controller = Arc::new(MockController::new("ctl_4", DropAddress(4)));
/// let mut op = OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(3));
/// while op.step(&mut link).unwrap() == Progress::Continue {}
/// assert!(op.is_success());
/// ```
#[derive(Debug)]
pub struct OpQueryStats {
    controller: Arc<dyn Controller>,
}

impl OpQueryStats {
    /// Creates the transaction for `controller`.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        OpQueryStats { controller }
    }

    /// Creates a queueable operation at poll priority that reads configuration first if needed.
    pub fn operation(controller: Arc<dyn Controller>, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(controller)), Priority::Poll, retry))
    }
}

impl Transaction for OpQueryStats {
    type Phase = QueryStatsPhase;

    fn name(&self) -> &'static str {
        "QueryStats"
    }

    fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    fn begin(&mut self) -> QueryStatsPhase {
        QueryStatsPhase::QueryStats
    }

    fn poll(
        &mut self,
        phase: QueryStatsPhase,
        transport: &mut dyn Transport,
    ) -> Result<Option<QueryStatsPhase>, CommError> {
        let drop = self.controller.drop_address();
        match phase {
            QueryStatsPhase::QuerySetup => {
                let setup = query_setup(transport, &*self.controller)?;
                if setup.needs_update() {
                    info!(target: LOG_TARGET, "{}: setup not suited to polling", self.controller.name());
                }
                Ok(None)
            }
            QueryStatsPhase::QueryStats => {
                let stats = g4::query_stats(transport, drop)?;
                if stats.header.sensor_id != drop {
                    return Err(CommError::protocol(format!(
                        "Statistics from sensor {:04X}, expected {:04X}",
                        stats.header.sensor_id, drop
                    )));
                }
                info!(
                    target: LOG_TARGET,
                    "{}: msg {}, {} zones, {:.1} V",
                    self.controller.name(),
                    stats.header.msg_num,
                    stats.header.zones,
                    stats.header.voltage
                );
                stats.samples.store(&*self.controller, 1);
                Ok(None)
            }
        }
    }
}

impl Configure for OpQueryStats {
    fn configure(&mut self) -> QueryStatsPhase {
        QueryStatsPhase::QuerySetup
    }
}

/// Phases of [`OpSendSettings`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SendSettingsPhase {
    /// Read the current setup information.
    QuerySetup,

    /// Store setup information suited to polling.
    StoreSetup(SetupInfo),

    /// Read the sensor's clock.
    QueryRtc,

    /// Set the sensor's clock to the host's.
    StoreRtc,
}

/// Downloads settings to a G4 sensor: polled ports, a 30 second period with two vehicle
/// classes, and a clock within [`CLOCK_TOLERANCE_MS`] of the host's.
#[derive(Debug)]
pub struct OpSendSettings {
    controller: Arc<dyn Controller>,
}

impl OpSendSettings {
    /// Creates the transaction for `controller`.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        OpSendSettings { controller }
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
        SendSettingsPhase::QuerySetup
    }

    fn poll(
        &mut self,
        phase: SendSettingsPhase,
        transport: &mut dyn Transport,
    ) -> Result<Option<SendSettingsPhase>, CommError> {
        let drop = self.controller.drop_address();
        match phase {
            SendSettingsPhase::QuerySetup => {
                let setup = query_setup(transport, &*self.controller)?;
                if setup.needs_update() {
                    Ok(Some(SendSettingsPhase::StoreSetup(setup.to_polled(Utc::now().date_naive()))))
                } else {
                    Ok(Some(SendSettingsPhase::QueryRtc))
                }
            }
            SendSettingsPhase::StoreSetup(setup) => {
                info!(target: LOG_TARGET, "{}: storing {}", self.controller.name(), setup);
                let _ = g4::transact(transport, &setup.encode_store(drop), Qualifier::Setup)?;
                Ok(Some(SendSettingsPhase::QueryRtc))
            }
            SendSettingsPhase::QueryRtc => {
                let response = g4::transact(transport, &Rtc::encode_query(drop), Qualifier::Rtc)?;
                let Rtc(stamp) = Rtc::decode(&response)?;
                let error = (stamp - Utc::now()).num_milliseconds();
                debug!(target: LOG_TARGET, "{}: clock {} ({} ms off)", self.controller.name(), stamp, error);
                if error.abs() > CLOCK_TOLERANCE_MS {
                    Ok(Some(SendSettingsPhase::StoreRtc))
                } else {
                    Ok(None)
                }
            }
            SendSettingsPhase::StoreRtc => {
                let rtc = Rtc(Utc::now());
                info!(target: LOG_TARGET, "{}: setting clock to {}", self.controller.name(), rtc.0);
                let _ = g4::transact(transport, &rtc.encode_store(drop), Qualifier::Rtc)?;
                Ok(None)
            }
        }
    }
}

fn query_setup(transport: &mut dyn Transport, controller: &dyn Controller) -> Result<SetupInfo, CommError> {
    let response = g4::transact(
        transport,
        &SetupInfo::encode_query(controller.drop_address()),
        Qualifier::Setup,
    )?;
    let setup = SetupInfo::decode(&response)?;
    debug!(target: LOG_TARGET, "{}: {}", controller.name(), setup);
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    use crate::core::{DropAddress, VehClass};
    use crate::operation::Progress;
    use roadlink_testing::{ControllerCall, MockController, ScriptedTransport, VirtualDevice, VirtualG4, VirtualLink};

    fn run(op: &mut dyn Operation, link: &mut dyn Transport) -> Result<(), CommError> {
        while op.step(link)? == Progress::Continue {}
        Ok(())
    }

    #[test]
    fn stats_stored_after_configuration() {
        let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(8), 2)));
        sensor.lock().set_lane(0, 10, 200, Some(55), 3);
        let mut link = VirtualLink::new().with_device(sensor.clone()).with_chunk_size(7);
        let controller = Arc::new(MockController::new("ctl", DropAddress(8)));
        let mut op = OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(1));
        run(op.as_mut(), &mut link).unwrap();

        let calls = controller.calls();
        assert_eq!(ControllerCall::SetConfigured(true), calls[0]);
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::VehCount { period: 30, start_pin: 1, counts, class: None, .. }
                if counts == &[Some(10), Some(0)]
        )));
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::VehCount { counts, class: Some(VehClass(0)), .. } if counts == &[Some(7), Some(0)]
        )));
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::Speed { speeds, .. } if speeds == &[Some(55), None]
        )));
        assert_eq!(ControllerCall::CommFailed(false), *calls.last().unwrap());
        assert_eq!(1, sensor.lock().data_requests());
    }

    #[test]
    fn stats_from_wrong_sensor_rejected() {
        // Sensor 9 answers requests addressed to 8 with its own id.
        let mut stranger = VirtualG4::new(DropAddress(9), 1);
        let reply = stranger.process(&g4::G4Frame::data_request(DropAddress(9)).to_bytes()).unwrap();
        let request = g4::G4Frame::data_request(DropAddress(8)).to_bytes();
        let mut transport = ScriptedTransport::new().expect(request, reply);
        let controller = Arc::new(MockController::new("ctl", DropAddress(8)).with_configured(true));
        let mut op = OpQueryStats::new(controller);
        let error = op.poll(QueryStatsPhase::QueryStats, &mut transport).unwrap_err();
        assert!(matches!(error, CommError::Protocol { .. }));
    }

    #[test]
    fn settings_fix_setup_and_clock() {
        let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(3), 2)));
        sensor.lock().set_clock_offset(chrono::Duration::minutes(-10));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let controller = Arc::new(MockController::new("ctl", DropAddress(3)));
        let mut op = OpSendSettings::operation(controller, RetryPolicy::Limited(1));
        assert_eq!(Priority::Download, op.priority());
        run(op.as_mut(), &mut link).unwrap();

        let sensor = sensor.lock();
        assert!(!sensor.setup().needs_update());
        assert!(sensor.clock_offset().num_milliseconds().abs() < CLOCK_TOLERANCE_MS);
        assert_eq!(4, link.requests().len());
    }

    #[test]
    fn settings_left_alone_when_correct() {
        let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(3), 2)));
        let mut link = VirtualLink::new().with_device(sensor.clone());
        let controller = Arc::new(MockController::new("ctl", DropAddress(3)));
        run(OpSendSettings::operation(controller.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();

        let mut link = VirtualLink::new().with_device(sensor);
        run(OpSendSettings::operation(controller, RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        // Only the two queries.
        assert_eq!(2, link.requests().len());
    }
}
