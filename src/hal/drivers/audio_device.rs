use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};
use crate::hal::format_converter::{from_i16_slice, to_i16_slice, NativeSample};
use crate::hal::realtime::RealtimeBridge;
use crate::hal::types::{ResetKind, SoundEvent};

const SCRATCH_SAMPLES: usize = 8192;
const START_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound of blocks generated per output callback when there is no input
const MAX_BLOCKS_PER_CALLBACK: usize = 16;

/// Everything needed to build the cpal streams of one opened device
#[derive(Clone)]
pub struct StreamPlan {
    pub device: cpal::Device,
    pub input: Option<(cpal::StreamConfig, cpal::SampleFormat)>,
    pub output: Option<(cpal::StreamConfig, cpal::SampleFormat)>,
    pub frames: usize,
}

impl StreamPlan {
    fn input_channels(&self) -> usize {
        self.input.as_ref().map_or(0, |(config, _)| config.channels as usize)
    }

    fn output_channels(&self) -> usize {
        self.output.as_ref().map_or(0, |(config, _)| config.channels as usize)
    }
}

/// Collects device input into full blocks and runs the bridge on each one
struct CapturePump {
    bridge: Arc<RealtimeBridge>,
    block_in: Vec<i16>,
    filled: usize,
    block_out: Vec<i16>,
    producer: Option<HeapProd<i16>>,
}

impl CapturePump {
    fn push(&mut self, mut samples: &[i16]) {
        while !samples.is_empty() {
            let take = (self.block_in.len() - self.filled).min(samples.len());
            self.block_in[self.filled..self.filled + take].copy_from_slice(&samples[..take]);
            self.filled += take;
            samples = &samples[take..];

            if self.filled == self.block_in.len() {
                self.run_block();
            }
        }
    }

    fn run_block(&mut self) {
        self.bridge.process(&self.block_in, &mut self.block_out);
        if let Some(producer) = self.producer.as_mut() {
            producer.push_slice(&self.block_out);
        }
        self.filled = 0;
    }
}

/// Feeds the output stream from the FIFO, generating blocks itself when the
/// device has no input to drive processing
struct PlaybackPump {
    consumer: HeapCons<i16>,
    generator: Option<CapturePump>,
}

impl PlaybackPump {
    fn fill(&mut self, out: &mut [i16]) {
        if let Some(generator) = self.generator.as_mut() {
            let mut blocks = 0;
            while self.consumer.occupied_len() < out.len() && blocks < MAX_BLOCKS_PER_CALLBACK {
                generator.run_block();
                blocks += 1;
            }
        }

        let read = self.consumer.pop_slice(out);
        out[read..].fill(0);
    }
}

fn report_stream_error(bridge: &RealtimeBridge, err: cpal::StreamError) {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            warn!("Audio device no longer available");
            bridge.notify(SoundEvent::ReinitRequest(ResetKind::Reload));
        }
        cpal::StreamError::BackendSpecific { err } => {
            warn!("Audio stream error: {}", err);
            bridge.notify(SoundEvent::ReinitRequest(ResetKind::Reinit));
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut pump: CapturePump,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + NativeSample,
{
    let bridge = pump.bridge.clone();
    let mut scratch = vec![0i16; SCRATCH_SAMPLES];

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for chunk in data.chunks(scratch.len()) {
                let count = to_i16_slice(chunk, &mut scratch);
                pump.push(&scratch[..count]);
            }
        },
        move |err| report_stream_error(&bridge, err),
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut pump: PlaybackPump,
    bridge: Arc<RealtimeBridge>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + NativeSample,
{
    let mut scratch = vec![0i16; SCRATCH_SAMPLES];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for chunk in data.chunks_mut(scratch.len()) {
                let samples = &mut scratch[..chunk.len()];
                pump.fill(samples);
                from_i16_slice(samples, chunk);
            }
        },
        move |err| report_stream_error(&bridge, err),
        None,
    )?;
    Ok(stream)
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    pump: CapturePump,
) -> Result<cpal::Stream> {
    match format {
        cpal::SampleFormat::I16 => build_input::<i16>(device, config, pump),
        cpal::SampleFormat::I32 => build_input::<i32>(device, config, pump),
        cpal::SampleFormat::U16 => build_input::<u16>(device, config, pump),
        cpal::SampleFormat::U8 => build_input::<u8>(device, config, pump),
        cpal::SampleFormat::F32 => build_input::<f32>(device, config, pump),
        cpal::SampleFormat::F64 => build_input::<f64>(device, config, pump),
        other => bail!("Unsupported input sample format {:?}", other),
    }
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: cpal::SampleFormat,
    pump: PlaybackPump,
    bridge: Arc<RealtimeBridge>,
) -> Result<cpal::Stream> {
    match format {
        cpal::SampleFormat::I16 => build_output::<i16>(device, config, pump, bridge),
        cpal::SampleFormat::I32 => build_output::<i32>(device, config, pump, bridge),
        cpal::SampleFormat::U16 => build_output::<u16>(device, config, pump, bridge),
        cpal::SampleFormat::U8 => build_output::<u8>(device, config, pump, bridge),
        cpal::SampleFormat::F32 => build_output::<f32>(device, config, pump, bridge),
        cpal::SampleFormat::F64 => build_output::<f64>(device, config, pump, bridge),
        other => bail!("Unsupported output sample format {:?}", other),
    }
}

/// Build the input and/or output streams of a plan, wired through a FIFO
fn build_streams(plan: &StreamPlan, bridge: &Arc<RealtimeBridge>) -> Result<Vec<cpal::Stream>> {
    let in_channels = plan.input_channels();
    let out_channels = plan.output_channels();
    let block_out_len = plan.frames * out_channels;

    let (mut producer, consumer) = HeapRb::<i16>::new((block_out_len * 4).max(1)).split();
    // One block of latency absorbs jitter between the two device clocks
    for _ in 0..block_out_len {
        let _ = producer.try_push(0);
    }

    let mut capture = CapturePump {
        bridge: bridge.clone(),
        block_in: vec![0; plan.frames * in_channels],
        filled: 0,
        block_out: vec![0; block_out_len],
        producer: None,
    };

    let mut streams = Vec::with_capacity(2);
    match (&plan.input, &plan.output) {
        (Some((in_config, in_format)), Some((out_config, out_format))) => {
            capture.producer = Some(producer);
            streams.push(build_input_stream(&plan.device, in_config, *in_format, capture)?);
            let playback = PlaybackPump {
                consumer,
                generator: None,
            };
            streams.push(build_output_stream(&plan.device, out_config, *out_format, playback, bridge.clone())?);
        }
        (Some((in_config, in_format)), None) => {
            streams.push(build_input_stream(&plan.device, in_config, *in_format, capture)?);
        }
        (None, Some((out_config, out_format))) => {
            capture.producer = Some(producer);
            let playback = PlaybackPump {
                consumer,
                generator: Some(capture),
            };
            streams.push(build_output_stream(&plan.device, out_config, *out_format, playback, bridge.clone())?);
        }
        (None, None) => bail!("Device has neither input nor output"),
    }

    Ok(streams)
}

/// Thread owning the cpal streams; they only play while it keeps them alive
pub struct StreamThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    pub fn spawn(plan: StreamPlan, bridge: Arc<RealtimeBridge>) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("cpal-streams".to_string())
            .spawn(move || {
                let streams = match build_streams(&plan, &bridge) {
                    Ok(streams) => streams,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for stream in &streams {
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(anyhow::Error::from(e)));
                        return;
                    }
                }
                let _ = ready_tx.send(Ok(()));

                // Stop request or the owner went away
                let _ = stop_rx.recv();
                for stream in &streams {
                    if let Err(e) = stream.pause() {
                        debug!("Pausing stream failed: {}", e);
                    }
                }
                drop(streams);
            })?;

        match ready_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => Ok(Self { stop_tx, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = stop_tx.send(());
                bail!("Audio streams did not start within {:?}", START_TIMEOUT)
            }
        }
    }

    /// Drop the streams and wait until the thread has let go of them
    pub fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        self.handle
            .join()
            .map_err(|_| anyhow!("Audio stream thread panicked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::channel_mapper::ChannelMapper;
    use crate::hal::types::ChannelSelection;

    fn bridge(frames: usize, inputs: usize, outputs: usize) -> Arc<RealtimeBridge> {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let bridge = RealtimeBridge::new(Box::new(|samples: &mut [i16]| samples.reverse()), tx);
        let routing = ChannelMapper::routing(&ChannelSelection::default(), inputs, outputs).unwrap();
        bridge.configure(frames, routing);
        bridge.activate();
        Arc::new(bridge)
    }

    #[test]
    fn test_capture_runs_only_full_blocks() {
        let bridge = bridge(4, 2, 2);
        let (producer, mut consumer) = HeapRb::<i16>::new(64).split();
        let mut pump = CapturePump {
            bridge: bridge.clone(),
            block_in: vec![0; 8],
            filled: 0,
            block_out: vec![0; 8],
            producer: Some(producer),
        };

        pump.push(&[1, 2, 3, 4, 5]);
        assert_eq!(bridge.callbacks(), 0);
        assert_eq!(consumer.occupied_len(), 0);

        pump.push(&[6, 7, 8, 9, 10]);
        assert_eq!(bridge.callbacks(), 1);
        assert_eq!(pump.filled, 2);

        let mut out = [0i16; 8];
        assert_eq!(consumer.pop_slice(&mut out), 8);
        assert_eq!(out, [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_playback_generates_blocks_without_input() {
        let bridge = bridge(4, 0, 2);
        let (producer, consumer) = HeapRb::<i16>::new(64).split();
        let generator = CapturePump {
            bridge: bridge.clone(),
            block_in: Vec::new(),
            filled: 0,
            block_out: vec![0; 8],
            producer: Some(producer),
        };
        let mut pump = PlaybackPump {
            consumer,
            generator: Some(generator),
        };

        let mut out = [1i16; 12];
        pump.fill(&mut out);
        assert_eq!(bridge.callbacks(), 2);
        assert_eq!(pump.consumer.occupied_len(), 4);
    }

    #[test]
    fn test_playback_underrun_is_silent() {
        let (_producer, consumer) = HeapRb::<i16>::new(16).split();
        let mut pump = PlaybackPump {
            consumer,
            generator: None,
        };

        let mut out = [5i16; 6];
        pump.fill(&mut out);
        assert_eq!(out, [0; 6]);
    }
}
