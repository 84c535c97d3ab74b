use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use anyhow::{anyhow, bail, Result};
use parking_lot::Mutex;
use tracing::debug;
use crate::hal::format_converter::NativeSample;
use crate::hal::realtime::RealtimeBridge;
use crate::hal::traits::AudioBackend;
use crate::hal::types::*;

/// A scripted device on the simulated host
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub name: String,
    pub input_channels: usize,
    pub output_channels: usize,
    pub buffer_sizes: BufferSizes,
    pub sample_format: SampleFormat,
    pub is_default: bool,
    /// Native rate the device is locked to; follows the request when unset
    pub sample_rate: Option<u32>,
    pub fail_open: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
}

impl SimulatedDevice {
    pub fn new(name: &str, input_channels: usize, output_channels: usize) -> Self {
        Self {
            name: name.to_string(),
            input_channels,
            output_channels,
            buffer_sizes: BufferSizes::Discrete(vec![64, 128, 256, 512]),
            sample_format: SampleFormat::I16,
            is_default: false,
            sample_rate: None,
            fail_open: false,
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn with_buffer_sizes(mut self, sizes: BufferSizes) -> Self {
        self.buffer_sizes = sizes;
        self
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = format;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

#[derive(Default)]
struct HostState {
    devices: Vec<SimulatedDevice>,
    fail_enumeration: bool,
    last_output: Vec<i16>,
}

/// Shared view of the simulated host, used by tests to plug and unplug devices
#[derive(Clone, Default)]
pub struct SimulatedHost {
    inner: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HostState {
                devices,
                ..HostState::default()
            })),
        }
    }

    pub fn plug(&self, device: SimulatedDevice) {
        self.inner.lock().devices.push(device);
    }

    /// Remove a device; returns whether it was present
    pub fn unplug(&self, name: &str) -> bool {
        let mut state = self.inner.lock();
        let before = state.devices.len();
        state.devices.retain(|d| d.name != name);
        state.devices.len() != before
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.inner.lock().fail_enumeration = fail;
    }

    /// Change a device in place (e.g. make it refuse to open)
    pub fn update(&self, name: &str, f: impl FnOnce(&mut SimulatedDevice)) -> bool {
        let mut state = self.inner.lock();
        match state.devices.iter_mut().find(|d| d.name == name) {
            Some(device) => {
                f(device);
                true
            }
            None => false,
        }
    }

    pub fn device(&self, name: &str) -> Option<SimulatedDevice> {
        self.inner.lock().devices.iter().find(|d| d.name == name).cloned()
    }

    /// Last block the realtime thread wrote to the device output
    pub fn last_output(&self) -> Vec<i16> {
        self.inner.lock().last_output.clone()
    }

    fn present(&self, name: &str) -> bool {
        self.inner.lock().devices.iter().any(|d| d.name == name)
    }
}

struct OpenedStream {
    device: SimulatedDevice,
    stream: NegotiatedStream,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// In-process backend driving the bridge from its own "realtime" thread.
///
/// Input channels carry a sine wave quantized through the device's native
/// sample format.
pub struct SimulatedBackend {
    host: SimulatedHost,
    opened: Option<OpenedStream>,
    worker: Option<Worker>,
    period: Option<Duration>,
    frequency: f64,
    amplitude: f64,
}

impl SimulatedBackend {
    pub fn new(host: SimulatedHost) -> Self {
        Self {
            host,
            opened: None,
            worker: None,
            period: None,
            frequency: 1000.0,
            amplitude: 0.5,
        }
    }

    /// Host with a stereo default device, a four-channel interface and a mono mic
    pub fn with_default_host() -> Self {
        Self::new(SimulatedHost::new(vec![
            SimulatedDevice::new("Simulated Stereo", 2, 2).as_default(),
            SimulatedDevice::new("Simulated Interface", 4, 4)
                .with_format(SampleFormat::F32)
                .with_buffer_sizes(BufferSizes::Range { min: 32, max: 1024 }),
            SimulatedDevice::new("Simulated Microphone", 1, 0),
        ]))
    }

    /// Callback cadence; defaults to the real block duration
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_tone(mut self, frequency: f64, amplitude: f64) -> Self {
        self.frequency = frequency;
        self.amplitude = amplitude;
        self
    }

    pub fn host(&self) -> &SimulatedHost {
        &self.host
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }

    fn host_device(&self, name: &str) -> Result<SimulatedDevice> {
        self.host
            .device(name)
            .ok_or_else(|| anyhow!("Device {} not present", name))
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                debug!("Simulated realtime thread panicked");
            }
        }
    }
}

/// Sine sample as the device would deliver it after native quantization
fn quantize(format: SampleFormat, value: f64) -> i16 {
    let sample = value.to_i16();
    match format {
        SampleFormat::U8 => u8::from_i16(sample).to_i16(),
        SampleFormat::U16 => u16::from_i16(sample).to_i16(),
        SampleFormat::I32 => i32::from_i16(sample).to_i16(),
        SampleFormat::F32 => (value as f32).to_i16(),
        _ => sample,
    }
}

impl AudioBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let state = self.host.inner.lock();
        if state.fail_enumeration {
            bail!("Simulated host audio service unavailable");
        }

        Ok(state
            .devices
            .iter()
            .map(|d| DeviceInfo {
                name: d.name.clone(),
                input_channels: d.input_channels,
                output_channels: d.output_channels,
                is_default: d.is_default,
            })
            .collect())
    }

    fn buffer_sizes(&self, device: &DeviceDescriptor) -> Result<BufferSizes> {
        Ok(self.host_device(&device.name)?.buffer_sizes)
    }

    fn probe(&self, device: &DeviceDescriptor) -> Result<()> {
        let device = self.host_device(&device.name)?;
        if device.fail_open {
            bail!("Device {} refuses to open", device.name);
        }
        Ok(())
    }

    fn open(&mut self, device: &DeviceDescriptor, request: &StreamRequest) -> Result<NegotiatedStream> {
        self.close();

        let device = self.host_device(&device.name)?;
        if device.fail_open {
            bail!("Device {} refuses to open", device.name);
        }

        let stream = NegotiatedStream {
            sample_format: device.sample_format,
            sample_rate: device.sample_rate.unwrap_or(request.sample_rate),
            buffer_size: device.buffer_sizes.nearest(request.buffer_size),
            input_channels: device.input_channels,
            output_channels: device.output_channels,
        };

        self.opened = Some(OpenedStream {
            device,
            stream: stream.clone(),
        });
        Ok(stream)
    }

    fn start(&mut self, bridge: Arc<RealtimeBridge>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let opened = self
            .opened
            .as_ref()
            .ok_or_else(|| anyhow!("No device opened"))?;
        if opened.device.fail_start {
            bail!("Device {} refuses to start", opened.device.name);
        }

        let name = opened.device.name.clone();
        let format = opened.device.sample_format;
        let stream = opened.stream.clone();
        let frames = stream.buffer_size as usize;
        let period = self.period.unwrap_or_else(|| {
            Duration::from_secs_f64(frames as f64 / stream.sample_rate as f64)
        });
        let delta_phase = 2.0 * PI * self.frequency / stream.sample_rate as f64;
        let amplitude = self.amplitude;
        let host = self.host.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("simulated-audio".to_string())
            .spawn(move || {
                let mut input = vec![0i16; frames * stream.input_channels];
                let mut output = vec![0i16; frames * stream.output_channels];
                let mut phase = 0.0f64;

                while !stop_flag.load(Ordering::Acquire) {
                    if !host.present(&name) {
                        bridge.notify(SoundEvent::ReinitRequest(ResetKind::Reload));
                        break;
                    }

                    if stream.input_channels > 0 {
                        for frame in input.chunks_exact_mut(stream.input_channels) {
                            frame.fill(quantize(format, amplitude * phase.sin()));
                            phase += delta_phase;
                            if phase > 2.0 * PI {
                                phase -= 2.0 * PI;
                            }
                        }
                    }

                    bridge.process(&input, &mut output);

                    {
                        let mut state = host.inner.lock();
                        state.last_output.clear();
                        state.last_output.extend_from_slice(&output);
                    }

                    thread::sleep(period);
                }
            })?;

        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(opened) = &self.opened {
            if opened.device.fail_stop && self.worker.is_some() {
                bail!("Device {} refuses to stop", opened.device.name);
            }
        }
        self.join_worker();
        Ok(())
    }

    fn close(&mut self) {
        self.join_worker();
        self.opened = None;
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.join_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            index: 0,
            name: name.to_string(),
            input_channels: 2,
            output_channels: 2,
            is_default: false,
        }
    }

    #[test]
    fn test_enumeration_reflects_host() {
        let host = SimulatedHost::new(vec![SimulatedDevice::new("A", 2, 2)]);
        let mut backend = SimulatedBackend::new(host.clone());
        assert_eq!(backend.enumerate().unwrap().len(), 1);

        host.plug(SimulatedDevice::new("B", 1, 0));
        assert_eq!(backend.enumerate().unwrap().len(), 2);

        host.set_fail_enumeration(true);
        assert!(backend.enumerate().is_err());
    }

    #[test]
    fn test_open_picks_nearest_buffer_size() {
        let host = SimulatedHost::new(vec![SimulatedDevice::new("A", 2, 2)]);
        let mut backend = SimulatedBackend::new(host);
        let request = StreamRequest {
            sample_rate: SYSTEM_SAMPLE_RATE_HZ,
            buffer_size: 200,
        };

        let stream = backend.open(&descriptor("A"), &request).unwrap();
        assert_eq!(stream.buffer_size, 256);
        assert_eq!(stream.sample_format, SampleFormat::I16);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let mut backend = SimulatedBackend::new(SimulatedHost::default());
        let request = StreamRequest {
            sample_rate: SYSTEM_SAMPLE_RATE_HZ,
            buffer_size: 128,
        };
        assert!(backend.open(&descriptor("gone"), &request).is_err());
    }

    #[test]
    fn test_quantize_u8_loses_low_bits() {
        let sample = quantize(SampleFormat::U8, 0.3);
        assert_eq!(sample & 0xFF, 0);
        assert!((sample as f64 / 32768.0 - 0.3).abs() < 0.01);
    }
}
