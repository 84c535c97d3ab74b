use std::sync::Arc;
use anyhow::Result;
use crossbeam_channel::Receiver;
use super::error::DriverFault;
use super::handle::PropertiesView;
use super::lifecycle::DriverState;
use super::realtime::RealtimeBridge;
use super::types::{
    BufferSizes, ChannelSelection, DeviceChangeCheck, DeviceDescriptor, DeviceInfo,
    NegotiatedStream, SoundEvent, SoundProperties, StreamRequest,
};

/// Native audio subsystem a driver sits on.
///
/// Implementations own every native handle. `start` hands them the bridge their
/// realtime thread must call for each block.
pub trait AudioBackend: Send {
    /// Backend identifier (e.g., "cpal", "simulated")
    fn name(&self) -> &str;

    /// List devices currently present on the host
    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>>;

    /// Buffer sizes the device accepts
    fn buffer_sizes(&self, device: &DeviceDescriptor) -> Result<BufferSizes>;

    /// Check the device could be opened, without opening it
    fn probe(&self, device: &DeviceDescriptor) -> Result<()>;

    /// Negotiate a stream on the device
    fn open(&mut self, device: &DeviceDescriptor, request: &StreamRequest) -> Result<NegotiatedStream>;

    /// Begin calling `bridge.process` from the realtime thread
    fn start(&mut self, bridge: Arc<RealtimeBridge>) -> Result<()>;

    /// Halt the realtime thread. On `Ok` no further `process` call is in flight.
    fn stop(&mut self) -> Result<()>;

    /// Release native handles of the opened device
    fn close(&mut self);
}

/// Contract between the application and a sound driver.
///
/// Every operation reports failure through its return value; the reason is
/// available from [`SoundDriver::last_fault`].
pub trait SoundDriver {
    /// Enumerate devices. `rescan == false` reuses a list already built.
    fn create_device_list(&mut self, rescan: bool) -> usize;

    /// Evaluate and perform a device change. Returns whether the active device changed.
    fn check_device_change(&mut self, mode: DeviceChangeCheck, device_index: usize) -> bool;

    /// Nearest buffer size (frames) the selected device supports, 0 without a device
    fn device_buffer_size(&self, desired: u32) -> u32;

    /// Release native handles of the active device. Idempotent.
    fn close_current_device(&mut self);

    /// Negotiate format and channel routing for the selected device
    fn open_device_setup(&mut self) -> bool;

    /// Start the callback chain. True only if the backend acknowledged.
    fn start(&mut self) -> bool;

    /// Stop the callback chain. True only if no further callback will run.
    fn stop(&mut self) -> bool;

    /// Called after the channel selection changed.
    ///
    /// Drivers whose processing path cannot pick up a new selection on the fly
    /// override this with a restart.
    fn on_channel_selection_changed(&mut self) {}

    fn driver_name(&self) -> &str;

    fn state(&self) -> DriverState;

    fn properties(&self) -> SoundProperties;

    /// Read-only handle that follows renegotiations
    fn properties_view(&self) -> PropertiesView;

    fn devices(&self) -> &[DeviceDescriptor];

    fn current_device(&self) -> Option<&DeviceDescriptor>;

    fn channel_selection(&self) -> ChannelSelection;

    /// Store a selection; returns whether it differs from the previous one
    fn apply_channel_selection(&mut self, selection: ChannelSelection) -> bool;

    /// Remember `desired` for future negotiations and return the size in effect
    fn request_buffer_size(&mut self, desired: u32) -> u32;

    fn last_fault(&self) -> Option<DriverFault>;

    /// Events for the control thread (device loss, reinit requests)
    fn events(&self) -> Receiver<SoundEvent>;

    fn select_channels(&mut self, selection: ChannelSelection) {
        if self.apply_channel_selection(selection) {
            self.on_channel_selection_changed();
        }
    }

    /// Stop and start again if running
    fn restart(&mut self) -> bool {
        if self.state() != DriverState::Running {
            return true;
        }
        self.stop() && self.start()
    }

    /// Switch to the first device called `name`
    fn select_device_by_name(&mut self, name: &str) -> bool {
        self.create_device_list(false);
        let index = match self.devices().iter().position(|d| d.name == name) {
            Some(index) => index,
            None => return false,
        };

        if self.current_device().map(|d| d.index) == Some(index) && self.state().is_open() {
            return true;
        }
        self.check_device_change(DeviceChangeCheck::Insert, index)
    }
}
