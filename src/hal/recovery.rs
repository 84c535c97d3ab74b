//! Control-thread reactions to driver events.

use crossbeam_channel::Receiver;
use tracing::{info, warn};
use super::lifecycle::DriverState;
use super::traits::SoundDriver;
use super::types::{DeviceChangeCheck, DeviceDescriptor, ResetKind, SoundEvent};

/// Preferred device by name, else the host default, else the first one
pub fn pick_device(devices: &[DeviceDescriptor], preferred: Option<&str>) -> Option<usize> {
    preferred
        .and_then(|name| devices.iter().position(|d| d.name == name))
        .or_else(|| devices.iter().position(|d| d.is_default))
        .or(if devices.is_empty() { None } else { Some(0) })
}

/// Reselect a device after the active one went away
pub fn recover_lost_device(driver: &mut dyn SoundDriver, preferred: Option<&str>, restart: bool) -> bool {
    if driver.create_device_list(true) == 0 {
        warn!("No audio device left to recover to");
        return false;
    }

    let index = match pick_device(driver.devices(), preferred) {
        Some(index) => index,
        None => return false,
    };

    driver.check_device_change(DeviceChangeCheck::Insert, index);
    if !driver.state().is_open() {
        return false;
    }

    info!(device = %driver.devices()[index].name, "Recovered audio device");
    !restart || driver.start()
}

/// Renegotiate the current device, restarting it if it was running
fn reinit(driver: &mut dyn SoundDriver) -> bool {
    let was_running = driver.state() == DriverState::Running;
    driver.close_current_device();
    driver.open_device_setup() && (!was_running || driver.start())
}

/// React to one event. Returns false when the reaction failed.
pub fn handle_event(driver: &mut dyn SoundDriver, event: &SoundEvent, preferred: Option<&str>) -> bool {
    match event {
        SoundEvent::DeviceListChanged { .. } | SoundEvent::DeviceChanged { .. } => true,
        SoundEvent::DeviceLost { name, was_running } => {
            warn!(device = %name, "Audio device lost");
            recover_lost_device(driver, preferred, *was_running)
        }
        SoundEvent::ReinitRequest(ResetKind::Restart) => driver.restart(),
        SoundEvent::ReinitRequest(ResetKind::Reinit) => reinit(driver),
        SoundEvent::ReinitRequest(ResetKind::Reload) => {
            // A vanished device is turned into DeviceLost by the rescan
            driver.create_device_list(true);
            !driver.state().is_open() || reinit(driver)
        }
    }
}

/// Handle every pending event; returns how many were handled
pub fn drain_events(
    driver: &mut dyn SoundDriver,
    events: &Receiver<SoundEvent>,
    preferred: Option<&str>,
) -> usize {
    let mut handled = 0;
    while let Ok(event) = events.try_recv() {
        if !handle_event(driver, &event, preferred) {
            warn!(?event, "Event handling failed: {:?}", driver.last_fault());
        }
        handled += 1;
    }
    handled
}
