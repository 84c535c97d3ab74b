use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use jamsound::hal::mock::{SimulatedBackend, SimulatedDevice, SimulatedHost};
use jamsound::hal::*;

fn counting_driver(host: SimulatedHost) -> (Sound<SimulatedBackend>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let backend = SimulatedBackend::new(host).with_period(Duration::from_millis(1));
    let driver = Sound::new(
        backend,
        Box::new(move |_samples: &mut [i16]| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    (driver, calls)
}

fn stereo_host() -> SimulatedHost {
    SimulatedHost::new(vec![SimulatedDevice::new("Stereo", 2, 2).as_default()])
}

fn open_first(driver: &mut Sound<SimulatedBackend>) {
    assert!(driver.create_device_list(true) > 0);
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.state(), DriverState::Configured);
}

#[test]
fn test_start_stop_no_late_callbacks() {
    let (mut driver, calls) = counting_driver(stereo_host());
    open_first(&mut driver);

    assert!(driver.start());
    assert_eq!(driver.state(), DriverState::Running);
    thread::sleep(Duration::from_millis(50));
    assert!(calls.load(Ordering::SeqCst) > 0, "No callbacks while running");

    assert!(driver.stop());
    assert_eq!(driver.state(), DriverState::Configured);
    let after_stop = calls.load(Ordering::SeqCst);

    thread::sleep(Duration::from_millis(30));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop, "Callback ran after stop");
    assert_eq!(driver.bridge().callbacks() as usize, after_stop);
}

#[test]
fn test_restart_after_stop() {
    let (mut driver, calls) = counting_driver(stereo_host());
    open_first(&mut driver);

    assert!(driver.start());
    assert!(driver.stop());
    let first_run = calls.load(Ordering::SeqCst);

    assert!(driver.start());
    thread::sleep(Duration::from_millis(30));
    assert!(driver.stop());
    assert!(calls.load(Ordering::SeqCst) > first_run);
}

#[test]
fn test_start_while_running_is_noop() {
    let (mut driver, _calls) = counting_driver(stereo_host());
    open_first(&mut driver);

    assert!(driver.start());
    assert!(driver.start());
    assert_eq!(driver.state(), DriverState::Running);
    assert!(driver.backend().is_streaming());
}

#[test]
fn test_start_after_close_fails() {
    let (mut driver, calls) = counting_driver(stereo_host());
    open_first(&mut driver);

    driver.close_current_device();
    assert_eq!(driver.state(), DriverState::Closed);

    assert!(!driver.start());
    assert!(matches!(driver.last_fault(), Some(DriverFault::StartStop(_))));
    thread::sleep(Duration::from_millis(10));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_close_is_idempotent() {
    let (mut driver, _calls) = counting_driver(stereo_host());

    // nothing opened yet
    driver.close_current_device();
    assert_eq!(driver.state(), DriverState::Closed);

    open_first(&mut driver);
    assert!(driver.start());

    driver.close_current_device();
    driver.close_current_device();
    assert_eq!(driver.state(), DriverState::Closed);
    assert!(!driver.backend().is_streaming());
    assert_eq!(driver.properties().device_name, None);
}

#[test]
fn test_stop_when_not_running_succeeds() {
    let (mut driver, _calls) = counting_driver(stereo_host());
    assert!(driver.stop());

    open_first(&mut driver);
    assert!(driver.stop());
    assert_eq!(driver.state(), DriverState::Configured);
}

#[test]
fn test_refused_start_stays_configured() {
    let host = SimulatedHost::new(vec![SimulatedDevice::new("Stubborn", 2, 2).failing_start()]);
    let (mut driver, _calls) = counting_driver(host);
    open_first(&mut driver);

    assert!(!driver.start());
    assert_eq!(driver.state(), DriverState::Configured);
    assert!(!driver.bridge().is_active());
    assert!(matches!(driver.last_fault(), Some(DriverFault::StartStop(_))));
}

#[test]
fn test_refused_stop_closes_device() {
    let host = SimulatedHost::new(vec![SimulatedDevice::new("Stuck", 2, 2).failing_stop()]);
    let (mut driver, calls) = counting_driver(host);
    open_first(&mut driver);
    assert!(driver.start());
    thread::sleep(Duration::from_millis(10));

    assert!(!driver.stop());
    assert_eq!(driver.state(), DriverState::Closed);
    assert!(!driver.backend().is_streaming());

    let after_stop = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[test]
fn test_open_publishes_properties() {
    let (mut driver, _calls) = counting_driver(stereo_host());
    let view = driver.properties_view();
    assert_eq!(view.buffer_size(), 0);

    open_first(&mut driver);

    let properties = driver.properties();
    assert_eq!(properties.driver_name, "simulated");
    assert_eq!(properties.device_name.as_deref(), Some("Stereo"));
    assert_eq!(properties.sample_format, SampleFormat::I16);
    assert_eq!(properties.sample_rate, SYSTEM_SAMPLE_RATE_HZ);
    assert_eq!(properties.buffer_size, DEFAULT_BUFFER_SIZE);
    assert_eq!(properties.stereo_buffer_len(), DEFAULT_BUFFER_SIZE as usize * 2);
    assert_eq!(properties.output_channel_names, vec!["Ch 1", "Ch 2"]);
    assert_eq!(view.snapshot(), properties);
}

#[test]
fn test_open_without_device_fails() {
    let (mut driver, _calls) = counting_driver(stereo_host());

    assert!(!driver.open_device_setup());
    assert_eq!(driver.state(), DriverState::Closed);
    assert!(matches!(driver.last_fault(), Some(DriverFault::Negotiation(_))));
}

#[test]
fn test_callback_output_reaches_device() {
    let host = stereo_host();
    let backend = SimulatedBackend::new(host.clone()).with_period(Duration::from_millis(1));
    let mut driver = Sound::new(
        backend,
        Box::new(|samples: &mut [i16]| samples.fill(1000)),
    );
    open_first(&mut driver);

    assert!(driver.start());
    thread::sleep(Duration::from_millis(30));
    assert!(driver.stop());

    let output = host.last_output();
    assert_eq!(output.len(), DEFAULT_BUFFER_SIZE as usize * 2);
    assert!(output.iter().all(|&s| s == 1000));
}

#[test]
fn test_drop_stops_callbacks() {
    let (mut driver, calls) = counting_driver(stereo_host());
    open_first(&mut driver);
    assert!(driver.start());
    thread::sleep(Duration::from_millis(10));

    drop(driver);
    let after_drop = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), after_drop);
}
