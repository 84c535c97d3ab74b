use serde::{Deserialize, Serialize};

/// Sample rate every driver negotiates for
pub const SYSTEM_SAMPLE_RATE_HZ: u32 = 48000;

/// Smallest block the network layer works with
pub const SYSTEM_FRAME_SIZE_SAMPLES: u32 = 64;

/// Buffer size requested until the application asks for another one
pub const DEFAULT_BUFFER_SIZE: u32 = 2 * SYSTEM_FRAME_SIZE_SAMPLES;

/// Device discovery information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Position in the driver's device list
    pub index: usize,
    pub name: String,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Whether the host reports this as its default device
    pub is_default: bool,
}

/// What a backend reports for one device during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub input_channels: usize,
    pub output_channels: usize,
    pub is_default: bool,
}

impl DeviceInfo {
    pub fn into_descriptor(self, index: usize) -> DeviceDescriptor {
        DeviceDescriptor {
            index,
            name: self.name,
            input_channels: self.input_channels,
            output_channels: self.output_channels,
            is_default: self.is_default,
        }
    }
}

/// Native sample format of a device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    I16,  // 16-bit PCM
    I24,  // 24-bit packed
    I32,  // 32-bit integer
    F32,  // 32-bit float
    F64,  // 64-bit float
    U8,   // 8-bit unsigned
    U16,  // 16-bit unsigned
}

impl SampleFormat {
    /// Formats the realtime path knows how to convert to and from `i16`
    pub fn is_negotiable(self) -> bool {
        !matches!(self, SampleFormat::I24)
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::I16
    }
}

/// Buffer sizes (in frames) a device accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferSizes {
    /// Any size between `min` and `max` inclusive
    Range { min: u32, max: u32 },
    /// Only the listed sizes
    Discrete(Vec<u32>),
    /// Host does not report a constraint
    Any,
}

impl BufferSizes {
    /// Nearest supported size to `desired`; ties go to the larger size
    pub fn nearest(&self, desired: u32) -> u32 {
        match self {
            BufferSizes::Range { min, max } => desired.clamp(*min, (*max).max(*min)),
            BufferSizes::Discrete(sizes) => sizes
                .iter()
                .copied()
                .min_by_key(|&size| (size.abs_diff(desired), u32::MAX - size))
                .unwrap_or(desired),
            BufferSizes::Any => desired,
        }
    }
}

/// Selected device channels feeding (input) and fed by (output) the stereo buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSelection {
    pub input: [usize; 2],
    pub output: [usize; 2],
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            input: [0, 1],
            output: [0, 1],
        }
    }
}

/// Mode argument of `SoundDriver::check_device_change`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceChangeCheck {
    /// Would selecting the device change anything, and can it be opened
    Query,
    /// Switch to the device
    Insert,
    /// The device disappeared from the host
    Remove,
}

/// Negotiated device configuration, read-only for everyone but the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundProperties {
    pub driver_name: String,
    pub device_name: Option<String>,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    /// Frames per callback block
    pub buffer_size: u32,
    pub input_channels: usize,
    pub output_channels: usize,
    pub input_channel_names: Vec<String>,
    pub output_channel_names: Vec<String>,
    pub selection: ChannelSelection,
}

impl SoundProperties {
    /// Snapshot for a driver with no negotiated device
    pub fn closed(driver_name: &str) -> Self {
        Self {
            driver_name: driver_name.to_string(),
            device_name: None,
            sample_format: SampleFormat::default(),
            sample_rate: SYSTEM_SAMPLE_RATE_HZ,
            buffer_size: 0,
            input_channels: 0,
            output_channels: 0,
            input_channel_names: Vec::new(),
            output_channel_names: Vec::new(),
            selection: ChannelSelection::default(),
        }
    }

    /// Length of the interleaved stereo buffer handed to the processing callback
    pub fn stereo_buffer_len(&self) -> usize {
        self.buffer_size as usize * 2
    }
}

/// What the driver asks of the backend when opening a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate: u32,
    pub buffer_size: u32,
}

/// What the backend actually opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedStream {
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub input_channels: usize,
    pub output_channels: usize,
}

/// Severity of a reinit request raised by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetKind {
    /// Stop and start again
    Restart,
    /// Renegotiate the current device, then start
    Reinit,
    /// Rebuild the device list and reselect
    Reload,
}

/// Notifications for the control thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundEvent {
    DeviceListChanged { count: usize },
    DeviceChanged { name: String },
    DeviceLost { name: String, was_running: bool },
    ReinitRequest(ResetKind),
}
