//! Driver fault taxonomy
//!
//! Contract operations report failure through `bool`/`0` returns. The reason is
//! kept as the driver's last fault so the control thread can inspect it.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverFault {
    /// No devices found or the host refused to enumerate
    Enumeration(String),
    /// Format, buffer size or channel layout could not be negotiated
    Negotiation(String),
    /// The active device disappeared mid-session
    DeviceLost(String),
    /// The native subsystem refused to start or stop
    StartStop(String),
    /// Index outside the current device list
    InvalidDevice(usize),
}

impl fmt::Display for DriverFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enumeration(e) => write!(f, "Device enumeration failed: {}", e),
            Self::Negotiation(e) => write!(f, "Device negotiation failed: {}", e),
            Self::DeviceLost(name) => write!(f, "Device lost: {}", name),
            Self::StartStop(e) => write!(f, "Start/stop failed: {}", e),
            Self::InvalidDevice(index) => write!(f, "No device at index {}", index),
        }
    }
}

impl std::error::Error for DriverFault {}
