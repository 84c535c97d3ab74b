use std::time::Duration;
use jamsound::hal::mock::{SimulatedBackend, SimulatedDevice, SimulatedHost};
use jamsound::hal::*;

fn driver_with(device: SimulatedDevice) -> Sound<SimulatedBackend> {
    let host = SimulatedHost::new(vec![device]);
    let backend = SimulatedBackend::new(host).with_period(Duration::from_millis(1));
    let mut driver = Sound::new(backend, Box::new(|_| {}));
    assert_eq!(driver.create_device_list(true), 1);
    driver
}

#[test]
fn test_no_device_reports_zero() {
    let driver = driver_with(SimulatedDevice::new("A", 2, 2));
    assert_eq!(driver.device_buffer_size(128), 0);
}

#[test]
fn test_discrete_sizes_pick_nearest() {
    let mut driver = driver_with(SimulatedDevice::new("A", 2, 2));
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));

    assert_eq!(driver.device_buffer_size(100), 128);
    assert_eq!(driver.device_buffer_size(96), 128);
    assert_eq!(driver.device_buffer_size(1), 64);
    assert_eq!(driver.device_buffer_size(4096), 512);
}

#[test]
fn test_range_sizes_clamp() {
    let device = SimulatedDevice::new("A", 2, 2)
        .with_buffer_sizes(BufferSizes::Range { min: 32, max: 1024 });
    let mut driver = driver_with(device);
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));

    assert_eq!(driver.device_buffer_size(200), 200);
    assert_eq!(driver.device_buffer_size(8), 32);
    assert_eq!(driver.device_buffer_size(5000), 1024);
}

#[test]
fn test_buffer_size_is_idempotent() {
    let mut driver = driver_with(SimulatedDevice::new("A", 2, 2));
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));

    for desired in [1, 63, 96, 150, 300, 384, 10_000] {
        let size = driver.device_buffer_size(desired);
        assert_eq!(driver.device_buffer_size(desired), size);
        assert_eq!(driver.device_buffer_size(size), size, "desired {}", desired);
    }
}

#[test]
fn test_request_renegotiates_running_device() {
    let mut driver = driver_with(SimulatedDevice::new("A", 2, 2));
    let view = driver.properties_view();
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert!(driver.start());
    assert_eq!(view.buffer_size(), 128);

    assert_eq!(driver.request_buffer_size(300), 256);
    assert_eq!(driver.state(), DriverState::Running);
    assert_eq!(view.buffer_size(), 256);
    assert_eq!(driver.bridge().frames(), 256);

    // same size again is a no-op
    assert_eq!(driver.request_buffer_size(256), 256);
    assert_eq!(driver.state(), DriverState::Running);
}

#[test]
fn test_request_before_open_applies_on_open() {
    let mut driver = driver_with(SimulatedDevice::new("A", 2, 2));

    assert_eq!(driver.request_buffer_size(512), 0);
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.properties().buffer_size, 512);
}

#[test]
fn test_unconvertible_format_fails_negotiation() {
    let mut driver = driver_with(SimulatedDevice::new("Pro", 2, 2).with_format(SampleFormat::I24));

    assert!(!driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.state(), DriverState::Closed);
    assert!(matches!(driver.last_fault(), Some(DriverFault::Negotiation(_))));
}

#[test]
fn test_channel_selection_change_keeps_format() {
    let device = SimulatedDevice::new("Quad", 4, 4).with_format(SampleFormat::F32);
    let mut driver = driver_with(device);
    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert!(driver.start());
    let before = driver.properties();

    let selection = ChannelSelection {
        input: [4, 7],
        output: [2, 3],
    };
    driver.select_channels(selection);

    let after = driver.properties();
    assert_eq!(after.selection, selection);
    assert_eq!(after.sample_format, before.sample_format);
    assert_eq!(after.buffer_size, before.buffer_size);
    assert_eq!(driver.state(), DriverState::Running);
}

#[test]
fn test_out_of_range_selection_is_normalized() {
    let mut driver = driver_with(SimulatedDevice::new("A", 2, 2));
    assert!(driver.apply_channel_selection(ChannelSelection {
        input: [6, 1],
        output: [0, 5],
    }));

    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.channel_selection(), ChannelSelection::default());
    assert_eq!(driver.properties().selection, ChannelSelection::default());

    // unchanged selection reports no change
    assert!(!driver.apply_channel_selection(ChannelSelection::default()));
}

#[test]
fn test_foreign_sample_rate_fails_negotiation() {
    let mut driver = driver_with(SimulatedDevice::new("Consumer", 2, 2).with_sample_rate(44_100));

    assert!(!driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.state(), DriverState::Closed);
    assert!(matches!(driver.last_fault(), Some(DriverFault::Negotiation(_))));
    assert_eq!(driver.properties().device_name, None);
    assert!(!driver.open_device_setup());
}

#[test]
fn test_system_sample_rate_is_accepted() {
    let mut driver = driver_with(SimulatedDevice::new("Pro", 2, 2).with_sample_rate(SYSTEM_SAMPLE_RATE_HZ));

    assert!(driver.check_device_change(DeviceChangeCheck::Insert, 0));
    assert_eq!(driver.properties().sample_rate, SYSTEM_SAMPLE_RATE_HZ);
}
