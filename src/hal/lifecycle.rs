use serde::{Deserialize, Serialize};

/// Driver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No negotiated device, no native handles
    Closed,
    /// Device negotiated, callback chain idle
    Configured,
    /// Callback chain running
    Running,
}

impl DriverState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: DriverState) -> bool {
        use DriverState::*;

        matches!(
            (self, target),
            (Closed, Configured) |
            (Configured, Running) |
            (Running, Configured) |
            (Configured, Closed) |

            // Device loss and failed stops
            (Running, Closed)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Closed => "Closed",
            Self::Configured => "Configured",
            Self::Running => "Running",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl Default for DriverState {
    fn default() -> Self {
        Self::Closed
    }
}
