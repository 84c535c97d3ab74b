pub mod audio;
pub mod audio_device;

pub use audio::CpalBackend;
