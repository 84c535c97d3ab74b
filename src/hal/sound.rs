use std::sync::Arc;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};
use super::channel_mapper::ChannelMapper;
use super::error::DriverFault;
use super::handle::{PropertiesView, SharedProperties};
use super::lifecycle::DriverState;
use super::realtime::{ProcessCallback, RealtimeBridge};
use super::traits::{AudioBackend, SoundDriver};
use super::types::*;

/// Pending events kept for the control thread; newer ones are dropped when full
pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Sound driver implemented on top of an [`AudioBackend`].
///
/// Owns the device list, the lifecycle state, the negotiated properties and the
/// realtime bridge. The backend only deals with native handles.
pub struct Sound<B: AudioBackend> {
    backend: B,
    bridge: Arc<RealtimeBridge>,
    devices: Vec<DeviceDescriptor>,
    list_built: bool,
    current: Option<usize>,
    state: DriverState,
    properties: SharedProperties,
    selection: ChannelSelection,
    desired_buffer_size: u32,
    fault: Option<DriverFault>,
    events_tx: Sender<SoundEvent>,
    events_rx: Receiver<SoundEvent>,
}

impl<B: AudioBackend> Sound<B> {
    pub fn new(backend: B, callback: ProcessCallback) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_DEPTH);
        let bridge = Arc::new(RealtimeBridge::new(callback, events_tx.clone()));
        let properties = SharedProperties::new(SoundProperties::closed(backend.name()));

        Self {
            backend,
            bridge,
            devices: Vec::new(),
            list_built: false,
            current: None,
            state: DriverState::Closed,
            properties,
            selection: ChannelSelection::default(),
            desired_buffer_size: DEFAULT_BUFFER_SIZE,
            fault: None,
            events_tx,
            events_rx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Realtime bridge, mostly for its counters
    pub fn bridge(&self) -> &Arc<RealtimeBridge> {
        &self.bridge
    }

    fn set_state(&mut self, target: DriverState) {
        if !self.state.can_transition_to(target) {
            warn!(from = self.state.name(), to = target.name(), "Unexpected driver state transition");
        }
        debug!(from = self.state.name(), to = target.name(), "Driver state");
        self.state = target;
    }

    fn fail(&mut self, fault: DriverFault) {
        warn!(driver = self.backend.name(), "{}", fault);
        self.fault = Some(fault);
    }

    fn emit(&self, event: SoundEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(event = ?e.into_inner(), "Event queue full, dropping");
        }
    }

    fn publish_closed(&self) {
        let mut properties = SoundProperties::closed(self.backend.name());
        properties.selection = self.selection;
        self.properties.publish(properties);
    }

    /// Force `Closed` after the active device vanished and tell the control thread
    fn handle_device_loss(&mut self, name: String) {
        let was_running = self.state == DriverState::Running;

        self.bridge.deactivate();
        if was_running {
            if let Err(e) = self.backend.stop() {
                debug!("Stopping lost device failed: {:#}", e);
            }
        }
        if self.state.is_open() {
            self.backend.close();
            self.set_state(DriverState::Closed);
        }

        self.current = None;
        self.publish_closed();
        self.fail(DriverFault::DeviceLost(name.clone()));
        self.emit(SoundEvent::DeviceLost { name, was_running });
    }

    fn device_at(&mut self, index: usize) -> Option<DeviceDescriptor> {
        let device = self.devices.get(index).cloned();
        if device.is_none() {
            self.fail(DriverFault::InvalidDevice(index));
        }
        device
    }

    fn device_is_active(&self, index: usize) -> bool {
        self.current == Some(index) && self.state.is_open()
    }

    fn switch_device(&mut self, device: DeviceDescriptor) -> bool {
        let was_running = self.state == DriverState::Running;
        let previous = self.current;

        self.close_current_device();
        self.current = Some(device.index);

        if self.open_device_setup() {
            info!(device = %device.name, "Switched audio device");
            self.emit(SoundEvent::DeviceChanged { name: device.name });
            if was_running {
                self.start();
            }
            return true;
        }

        // Put the previous device back if it still negotiates
        self.current = previous;
        if previous.is_some() && self.open_device_setup() && was_running {
            self.start();
        }
        false
    }
}

impl<B: AudioBackend> SoundDriver for Sound<B> {
    fn create_device_list(&mut self, rescan: bool) -> usize {
        if self.list_built && !rescan {
            return self.devices.len();
        }

        let active_name = self.current_device().map(|d| d.name.clone());

        let infos = match self.backend.enumerate() {
            Ok(infos) => infos,
            Err(e) => {
                self.list_built = false;
                self.fail(DriverFault::Enumeration(format!("{:#}", e)));
                return 0;
            }
        };

        self.devices = infos
            .into_iter()
            .enumerate()
            .map(|(index, info)| info.into_descriptor(index))
            .collect();
        self.list_built = true;

        if self.devices.is_empty() {
            self.fail(DriverFault::Enumeration("no devices found".to_string()));
        }

        if let Some(name) = active_name {
            match self.devices.iter().position(|d| d.name == name) {
                Some(index) => self.current = Some(index),
                None if self.state.is_open() => self.handle_device_loss(name),
                None => self.current = None,
            }
        }

        debug!(count = self.devices.len(), "Device list built");
        self.emit(SoundEvent::DeviceListChanged {
            count: self.devices.len(),
        });
        self.devices.len()
    }

    fn check_device_change(&mut self, mode: DeviceChangeCheck, device_index: usize) -> bool {
        let device = match self.device_at(device_index) {
            Some(device) => device,
            None => return false,
        };

        match mode {
            DeviceChangeCheck::Query => {
                if self.device_is_active(device_index) {
                    return false;
                }
                match self.backend.probe(&device) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(device = %device.name, "Probe failed: {:#}", e);
                        false
                    }
                }
            }
            DeviceChangeCheck::Insert => {
                if self.device_is_active(device_index) {
                    return false;
                }
                self.switch_device(device)
            }
            DeviceChangeCheck::Remove => {
                if self.device_is_active(device_index) {
                    self.handle_device_loss(device.name);
                    self.create_device_list(true);
                    return true;
                }

                // A closed selection just goes away
                if self.current == Some(device_index) {
                    self.current = None;
                }
                self.create_device_list(true);
                false
            }
        }
    }

    fn device_buffer_size(&self, desired: u32) -> u32 {
        let device = match self.current_device() {
            Some(device) => device,
            None => return 0,
        };

        match self.backend.buffer_sizes(device) {
            Ok(sizes) => sizes.nearest(desired),
            Err(e) => {
                warn!(device = %device.name, "Buffer size query failed: {:#}", e);
                0
            }
        }
    }

    fn close_current_device(&mut self) {
        if self.state == DriverState::Running {
            self.stop();
        }

        if self.state.is_open() {
            self.bridge.deactivate();
            self.backend.close();
            self.set_state(DriverState::Closed);
            self.publish_closed();
        }
    }

    fn open_device_setup(&mut self) -> bool {
        if self.state.is_open() {
            return true;
        }

        let device = match self.current_device().cloned() {
            Some(device) => device,
            None => {
                self.fail(DriverFault::Negotiation("no device selected".to_string()));
                return false;
            }
        };

        let buffer_size = match self.backend.buffer_sizes(&device) {
            Ok(sizes) => sizes.nearest(self.desired_buffer_size),
            Err(e) => {
                self.fail(DriverFault::Negotiation(format!("{:#}", e)));
                return false;
            }
        };

        let request = StreamRequest {
            sample_rate: SYSTEM_SAMPLE_RATE_HZ,
            buffer_size,
        };

        let stream = match self.backend.open(&device, &request) {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(DriverFault::Negotiation(format!("{:#}", e)));
                return false;
            }
        };

        if !stream.sample_format.is_negotiable() {
            self.backend.close();
            self.fail(DriverFault::Negotiation(format!(
                "unsupported sample format {:?}",
                stream.sample_format
            )));
            return false;
        }

        if stream.sample_rate != SYSTEM_SAMPLE_RATE_HZ {
            self.backend.close();
            self.fail(DriverFault::Negotiation(format!(
                "device {} runs at {} Hz instead of {} Hz",
                device.name, stream.sample_rate, SYSTEM_SAMPLE_RATE_HZ
            )));
            return false;
        }

        if stream.buffer_size == 0 || (stream.input_channels == 0 && stream.output_channels == 0) {
            self.backend.close();
            self.fail(DriverFault::Negotiation(format!(
                "device {} offered no usable stream",
                device.name
            )));
            return false;
        }

        let selection = ChannelMapper::normalize(
            self.selection,
            stream.input_channels,
            stream.output_channels,
        );
        let routing = match ChannelMapper::routing(
            &selection,
            stream.input_channels,
            stream.output_channels,
        ) {
            Ok(routing) => routing,
            Err(e) => {
                self.backend.close();
                self.fail(DriverFault::Negotiation(format!("{:#}", e)));
                return false;
            }
        };

        self.selection = selection;
        self.bridge.configure(stream.buffer_size as usize, routing);
        self.properties.publish(SoundProperties {
            driver_name: self.backend.name().to_string(),
            device_name: Some(device.name.clone()),
            sample_format: stream.sample_format,
            sample_rate: stream.sample_rate,
            buffer_size: stream.buffer_size,
            input_channels: stream.input_channels,
            output_channels: stream.output_channels,
            input_channel_names: ChannelMapper::input_channel_names(stream.input_channels),
            output_channel_names: ChannelMapper::output_channel_names(stream.output_channels),
            selection,
        });
        self.set_state(DriverState::Configured);

        info!(
            device = %device.name,
            format = ?stream.sample_format,
            frames = stream.buffer_size,
            inputs = stream.input_channels,
            outputs = stream.output_channels,
            "Device configured"
        );
        true
    }

    fn start(&mut self) -> bool {
        match self.state {
            DriverState::Running => true,
            DriverState::Closed => {
                self.fail(DriverFault::StartStop("device not configured".to_string()));
                false
            }
            DriverState::Configured => {
                self.bridge.activate();
                match self.backend.start(self.bridge.clone()) {
                    Ok(()) => {
                        self.set_state(DriverState::Running);
                        true
                    }
                    Err(e) => {
                        self.bridge.deactivate();
                        self.fail(DriverFault::StartStop(format!("{:#}", e)));
                        false
                    }
                }
            }
        }
    }

    fn stop(&mut self) -> bool {
        if self.state != DriverState::Running {
            return true;
        }

        let result = self.backend.stop();
        self.bridge.deactivate();

        match result {
            Ok(()) => {
                self.set_state(DriverState::Configured);
                true
            }
            Err(e) => {
                // Native side is in an unknown state; drop it entirely
                self.fail(DriverFault::StartStop(format!("{:#}", e)));
                self.backend.close();
                self.set_state(DriverState::Closed);
                self.publish_closed();
                false
            }
        }
    }

    fn driver_name(&self) -> &str {
        self.backend.name()
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn properties(&self) -> SoundProperties {
        self.properties.snapshot()
    }

    fn properties_view(&self) -> PropertiesView {
        self.properties.view()
    }

    fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    fn current_device(&self) -> Option<&DeviceDescriptor> {
        self.current.and_then(|index| self.devices.get(index))
    }

    fn channel_selection(&self) -> ChannelSelection {
        self.selection
    }

    fn apply_channel_selection(&mut self, selection: ChannelSelection) -> bool {
        if !self.state.is_open() {
            let changed = selection != self.selection;
            self.selection = selection;
            return changed;
        }

        let mut properties = self.properties.snapshot();
        let normalized = ChannelMapper::normalize(
            selection,
            properties.input_channels,
            properties.output_channels,
        );
        if normalized == self.selection {
            return false;
        }

        match ChannelMapper::routing(&normalized, properties.input_channels, properties.output_channels) {
            Ok(routing) => {
                self.bridge.set_routing(routing);
                self.selection = normalized;
                properties.selection = normalized;
                self.properties.publish(properties);
                true
            }
            Err(e) => {
                warn!("Channel selection rejected: {:#}", e);
                false
            }
        }
    }

    fn request_buffer_size(&mut self, desired: u32) -> u32 {
        self.desired_buffer_size = desired;

        if !self.state.is_open() {
            return self.device_buffer_size(desired);
        }

        let actual = self.device_buffer_size(desired);
        if actual != 0 && actual != self.properties.snapshot().buffer_size {
            let was_running = self.state == DriverState::Running;
            self.close_current_device();
            if self.open_device_setup() && was_running {
                self.start();
            }
        }
        self.properties.snapshot().buffer_size
    }

    fn last_fault(&self) -> Option<DriverFault> {
        self.fault.clone()
    }

    fn events(&self) -> Receiver<SoundEvent> {
        self.events_rx.clone()
    }
}

impl<B: AudioBackend> Drop for Sound<B> {
    fn drop(&mut self) {
        self.close_current_device();
    }
}
