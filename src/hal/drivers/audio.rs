use std::sync::Arc;
use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::debug;
use crate::hal::realtime::RealtimeBridge;
use crate::hal::traits::AudioBackend;
use crate::hal::types::*;
use super::audio_device::{StreamPlan, StreamThread};

/// Backend on the host audio API picked by cpal (CoreAudio, WASAPI, ALSA...)
pub struct CpalBackend {
    devices: Vec<cpal::Device>,
    plan: Option<StreamPlan>,
    streams: Option<StreamThread>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            plan: None,
            streams: None,
        }
    }

    fn find(&self, descriptor: &DeviceDescriptor) -> Result<&cpal::Device> {
        resolve_device(&self.devices, descriptor, |d| d.name().ok())
    }
}

/// Device at the descriptor's list position, provided it still carries the same name
fn resolve_device<'a, D>(
    devices: &'a [D],
    descriptor: &DeviceDescriptor,
    name_of: impl Fn(&D) -> Option<String>,
) -> Result<&'a D> {
    let device = devices
        .get(descriptor.index)
        .ok_or_else(|| anyhow!("Device {} not present", descriptor.name))?;

    match name_of(device) {
        Some(name) if name == descriptor.name => Ok(device),
        other => bail!(
            "Device list changed: expected {} at index {}, found {:?}",
            descriptor.name,
            descriptor.index,
            other
        ),
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn map_format(format: cpal::SampleFormat) -> Result<SampleFormat> {
    Ok(match format {
        cpal::SampleFormat::I16 => SampleFormat::I16,
        cpal::SampleFormat::I32 => SampleFormat::I32,
        cpal::SampleFormat::U16 => SampleFormat::U16,
        cpal::SampleFormat::U8 => SampleFormat::U8,
        cpal::SampleFormat::F32 => SampleFormat::F32,
        cpal::SampleFormat::F64 => SampleFormat::F64,
        other => bail!("Unsupported sample format {:?}", other),
    })
}

/// Preference among native formats; 16-bit avoids a conversion
fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 3,
        cpal::SampleFormat::F32 => 2,
        cpal::SampleFormat::I32 | cpal::SampleFormat::U16 => 1,
        _ => 0,
    }
}

fn max_channels<I>(configs: Result<I, cpal::SupportedStreamConfigsError>) -> usize
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs
        .map(|configs| configs.map(|c| c.channels() as usize).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Pick a config running at the requested rate, falling back to the device default
fn negotiate(
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    fallback: Option<cpal::SupportedStreamConfig>,
    request: &StreamRequest,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    let rate = cpal::SampleRate(request.sample_rate);
    let supported = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .max_by_key(|r| (format_rank(r.sample_format()), r.channels()))
        .map(|r| r.with_sample_rate(rate))
        .or(fallback.filter(|c| c.sample_rate() == rate))
        .ok_or_else(|| anyhow!("No stream configuration available"))?;

    let format = supported.sample_format();
    let mut config = supported.config();
    config.buffer_size = cpal::BufferSize::Fixed(request.buffer_size);
    Ok((config, format))
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let mut infos = Vec::new();
        let mut devices = Vec::new();

        for device in host.devices().context("Failed to list host audio devices")? {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping unnamed device: {}", e);
                    continue;
                }
            };

            let input_channels = max_channels(device.supported_input_configs());
            let output_channels = max_channels(device.supported_output_configs());
            if input_channels == 0 && output_channels == 0 {
                continue;
            }

            let is_default = default_input.as_deref() == Some(name.as_str())
                || default_output.as_deref() == Some(name.as_str());

            infos.push(DeviceInfo {
                name,
                input_channels,
                output_channels,
                is_default,
            });
            devices.push(device);
        }

        self.devices = devices;
        Ok(infos)
    }

    fn buffer_sizes(&self, device: &DeviceDescriptor) -> Result<BufferSizes> {
        let device = self.find(device)?;
        let config = device
            .default_input_config()
            .or_else(|_| device.default_output_config())
            .context("Failed to query default stream config")?;

        Ok(match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => BufferSizes::Range {
                min: *min,
                max: *max,
            },
            cpal::SupportedBufferSize::Unknown => BufferSizes::Any,
        })
    }

    fn probe(&self, device: &DeviceDescriptor) -> Result<()> {
        let device = self.find(device)?;
        device
            .default_input_config()
            .or_else(|_| device.default_output_config())
            .context("Device has no usable stream config")?;
        Ok(())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor, request: &StreamRequest) -> Result<NegotiatedStream> {
        self.close();
        let device = self.find(descriptor)?.clone();

        let input = if descriptor.input_channels > 0 {
            let ranges = device
                .supported_input_configs()
                .context("Failed to query input configs")?
                .collect();
            Some(negotiate(ranges, device.default_input_config().ok(), request)?)
        } else {
            None
        };

        let output = if descriptor.output_channels > 0 {
            let ranges = device
                .supported_output_configs()
                .context("Failed to query output configs")?
                .collect();
            Some(negotiate(ranges, device.default_output_config().ok(), request)?)
        } else {
            None
        };

        let (sample_rate, sample_format) = match (&input, &output) {
            (Some((i, i_fmt)), Some((o, o_fmt))) => {
                if i.sample_rate != o.sample_rate {
                    bail!(
                        "Input and output run at different rates ({} / {})",
                        i.sample_rate.0,
                        o.sample_rate.0
                    );
                }
                map_format(*o_fmt)?;
                (i.sample_rate.0, map_format(*i_fmt)?)
            }
            (Some((i, fmt)), None) | (None, Some((i, fmt))) => (i.sample_rate.0, map_format(*fmt)?),
            (None, None) => bail!("Device {} has no streams", descriptor.name),
        };

        let plan = StreamPlan {
            device,
            input,
            output,
            frames: request.buffer_size as usize,
        };

        let stream = NegotiatedStream {
            sample_format,
            sample_rate,
            buffer_size: request.buffer_size,
            input_channels: plan.input.as_ref().map_or(0, |(c, _)| c.channels as usize),
            output_channels: plan.output.as_ref().map_or(0, |(c, _)| c.channels as usize),
        };

        self.plan = Some(plan);
        Ok(stream)
    }

    fn start(&mut self, bridge: Arc<RealtimeBridge>) -> Result<()> {
        if self.streams.is_some() {
            return Ok(());
        }
        let plan = self.plan.clone().ok_or_else(|| anyhow!("No device opened"))?;
        self.streams = Some(StreamThread::spawn(plan, bridge)?);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match self.streams.take() {
            Some(streams) => streams.stop(),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.stop() {
            debug!("Closing device: {:#}", e);
        }
        self.plan = None;
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}
