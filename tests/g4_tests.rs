use std::sync::Arc;

use parking_lot::Mutex;
use test_case::test_case;

use roadlink::core::{CommError, DropAddress, Transport, VehClass};
use roadlink::g4::OpQueryStats;
use roadlink::{Operation, Progress, RetryPolicy};
use roadlink_testing::{ControllerCall, MockController, VirtualG4, VirtualLink};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn poll_stats(sensor: Arc<Mutex<VirtualG4>>, chunk_size: usize) -> Vec<ControllerCall> {
    let mut link = VirtualLink::new().with_device(sensor).with_chunk_size(chunk_size);
    let controller = Arc::new(MockController::new("G4_31", DropAddress(31)).with_configured(true));
    let mut op = OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(1));
    while op.step(&mut link).unwrap() == Progress::Continue {}
    assert!(op.is_success());
    controller.take_calls()
}

fn three_lane_sensor() -> Arc<Mutex<VirtualG4>> {
    let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(31), 3)));
    {
        let mut sensor = sensor.lock();
        sensor.set_lane(0, 14, 120, Some(61), 2);
        sensor.set_lane(1, 0, 0, None, 0);
        sensor.set_lane(2, 31, 412, Some(47), 9);
    }
    sensor
}

#[test_case(1 ; "byte by byte")]
#[test_case(3 ; "tiny chunks")]
#[test_case(17 ; "odd chunks")]
#[test_case(4096 ; "all at once")]
fn statistics_independent_of_chunking(chunk_size: usize) {
    init_logging();
    let calls = poll_stats(three_lane_sensor(), chunk_size);

    let volume = calls.iter().find_map(|call| match call {
        ControllerCall::VehCount { counts, class: None, period, start_pin, .. } => {
            Some((counts.clone(), *period, *start_pin))
        }
        _ => None,
    });
    assert_eq!(Some((vec![Some(14), Some(0), Some(31)], 30, 1)), volume);

    let speeds = calls.iter().find_map(|call| match call {
        ControllerCall::Speed { speeds, .. } => Some(speeds.clone()),
        _ => None,
    });
    assert_eq!(Some(vec![Some(61), None, Some(47)]), speeds);

    let small = calls.iter().find_map(|call| match call {
        ControllerCall::VehCount { counts, class: Some(VehClass::SMALLEST), .. } => Some(counts.clone()),
        _ => None,
    });
    assert_eq!(Some(vec![Some(12), Some(0), Some(22)]), small);
}

#[test]
fn smallest_class_derived_from_total() {
    init_logging();
    let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(31), 2)));
    sensor.lock().set_lane(0, 10, 100, Some(50), 7);
    sensor.lock().set_lane(1, 5, 60, Some(52), 7);
    let calls = poll_stats(sensor, 64);
    let small = calls.iter().find_map(|call| match call {
        ControllerCall::VehCount { counts, class: Some(VehClass::SMALLEST), .. } => Some(counts.clone()),
        _ => None,
    });
    // More long vehicles than vehicles leaves the smallest class unknown, never negative.
    assert_eq!(Some(vec![Some(3), None]), small);
}

#[test]
fn corrupted_response_retried() {
    init_logging();
    let sensor = three_lane_sensor();
    sensor.lock().corrupt_next_response();
    let mut link = VirtualLink::new().with_device(sensor.clone());
    let controller = Arc::new(MockController::new("G4_31", DropAddress(31)).with_configured(true));
    let mut op = OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(2));
    let error = op.step(&mut link).unwrap_err();
    assert!(matches!(error, CommError::Checksum { .. }));
    let _ = op.fail(&error);
    link.drain().unwrap();
    while op.step(&mut link).unwrap() == Progress::Continue {}
    assert!(op.is_success());
    assert_eq!(2, sensor.lock().data_requests());
}
