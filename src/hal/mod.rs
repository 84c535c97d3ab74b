pub mod channel_mapper;
pub mod drivers;
pub mod error;
pub mod format_converter;
pub mod handle;
pub mod lifecycle;
pub mod mock;
pub mod realtime;
pub mod recovery;
pub mod registry;
pub mod sound;
pub mod traits;
pub mod types;

pub use channel_mapper::{ChannelMapper, ChannelRouting, InputSource};
pub use drivers::CpalBackend;
pub use error::DriverFault;
pub use handle::{BoxedDriver, PropertiesView, SharedProperties, SoundHandle, SoundSlot};
pub use lifecycle::DriverState;
pub use realtime::{ProcessCallback, RealtimeBridge};
pub use registry::{BackendRegistry, DEFAULT_BACKEND};
pub use sound::{Sound, EVENT_QUEUE_DEPTH};
pub use traits::{AudioBackend, SoundDriver};
pub use types::{
    BufferSizes, ChannelSelection, DeviceChangeCheck, DeviceDescriptor, DeviceInfo,
    NegotiatedStream, ResetKind, SampleFormat, SoundEvent, SoundProperties, StreamRequest,
    DEFAULT_BUFFER_SIZE, SYSTEM_FRAME_SIZE_SAMPLES, SYSTEM_SAMPLE_RATE_HZ,
};
