pub mod audio;

pub use audio::{SimulatedBackend, SimulatedDevice, SimulatedHost};
