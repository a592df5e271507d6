use std::sync::Arc;
use std::time::Duration;

use serial_core::{BaudRate, CharSize, FlowControl, Parity, StopBits};

use roadlink::core::{DropAddress, ErrorClass};
use roadlink::g4::OpQueryStats;
use roadlink::serial::{SerialTransport, TransportError};
use roadlink::ss125::OpSendSettings;
use roadlink::{Operation, Progress, RetryPolicy};
use roadlink_testing::{ControllerCall, MockController, VirtualG4, VirtualSs125};

mod mock_serial_port;
use crate::mock_serial_port::{MockSerialPort, SerialFailure};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn port_configured_for_field_devices() {
    init_logging();
    let port = MockSerialPort::new(VirtualG4::new(DropAddress(1), 1), SerialFailure::None);
    let transport = SerialTransport::new(port, 19200, Duration::from_secs(2)).unwrap();
    let settings = transport.port().settings();
    assert_eq!(BaudRate::Baud19200, settings.baud_rate);
    assert_eq!(CharSize::Bits8, settings.char_size);
    assert_eq!(Parity::ParityNone, settings.parity);
    assert_eq!(StopBits::Stop1, settings.stop_bits);
    assert_eq!(FlowControl::FlowNone, settings.flow_control);
}

#[test]
fn odd_baud_rate_refused() {
    let port = MockSerialPort::new(VirtualG4::new(DropAddress(1), 1), SerialFailure::None);
    let error = SerialTransport::new(port, 9601, Duration::from_secs(2)).unwrap_err();
    assert!(matches!(error, TransportError::UnsupportedBaud { baud: 9601 }));
}

#[test]
fn settings_failure_reported() {
    let port = MockSerialPort::new(VirtualG4::new(DropAddress(1), 1), SerialFailure::WriteSettings);
    let error = SerialTransport::new(port, 9600, Duration::from_secs(2)).unwrap_err();
    assert!(matches!(error, TransportError::Configuration { .. }));
}

#[test]
fn g4_statistics_over_serial() {
    init_logging();
    let mut sensor = VirtualG4::new(DropAddress(40), 2);
    sensor.set_lane(0, 6, 90, Some(44), 1);
    sensor.set_lane(1, 2, 30, Some(38), 0);
    let port = MockSerialPort::new(sensor, SerialFailure::None);
    let mut transport = SerialTransport::new(port, 9600, Duration::from_millis(500)).unwrap();

    let controller = Arc::new(MockController::new("G4_40", DropAddress(40)));
    let mut op = OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(1));
    while op.step(&mut transport).unwrap() == Progress::Continue {}

    assert!(op.is_success());
    assert_eq!(1, transport.port().device().data_requests());
    assert!(controller.calls().iter().any(|call| matches!(
        call,
        ControllerCall::VehCount { counts, class: None, .. } if counts == &[Some(6), Some(2)]
    )));
}

#[test]
fn ss125_settings_over_serial() {
    init_logging();
    let port = MockSerialPort::new(VirtualSs125::new(DropAddress(41)), SerialFailure::None);
    let mut transport = SerialTransport::new(port, 9600, Duration::from_millis(500)).unwrap();
    let controller = Arc::new(MockController::new("SS_41", DropAddress(41)).with_location("I-94 EB @ MP 12"));
    let mut op = OpSendSettings::operation(controller, RetryPolicy::Limited(1));
    while op.step(&mut transport).unwrap() == Progress::Continue {}
    assert!(op.is_success());
    assert_eq!("I-94 EB @ MP 12", transport.port().device().general().location);
}

#[test]
fn read_failure_is_io_error() {
    init_logging();
    let port = MockSerialPort::new(VirtualG4::new(DropAddress(42), 1), SerialFailure::Read);
    let mut transport = SerialTransport::new(port, 9600, Duration::from_millis(100)).unwrap();
    let controller = Arc::new(MockController::new("G4_42", DropAddress(42)).with_configured(true));
    let mut op = OpQueryStats::operation(controller, RetryPolicy::Limited(1));
    let error = op.step(&mut transport).unwrap_err();
    assert_eq!(ErrorClass::Io, error.class());
}

#[test]
fn silent_device_times_out() {
    init_logging();
    let port = MockSerialPort::new(VirtualG4::new(DropAddress(43), 1), SerialFailure::None);
    let mut transport = SerialTransport::new(port, 9600, Duration::from_millis(50)).unwrap();
    // Nobody answers drop 44.
    let controller = Arc::new(MockController::new("G4_44", DropAddress(44)).with_configured(true));
    let mut op = OpQueryStats::operation(controller, RetryPolicy::Limited(1));
    let error = op.step(&mut transport).unwrap_err();
    assert_eq!(ErrorClass::Timeout, error.class());
}
