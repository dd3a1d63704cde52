//! Machine states reported to the host.

use std::fmt;

use crate::compute::InstanceState;

/// Coarse machine state exposed through [`super::MachineDriver`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// Booting.
    Starting,
    /// Up and reachable.
    Running,
    /// Shutting down.
    Stopping,
    /// Powered off, or being deleted.
    Stopped,
    /// Temporarily suspended, for example during a migration.
    Paused,
    /// Failed.
    Error,
    /// Not recognised.
    Unknown,
}

impl From<InstanceState> for MachineState {
    fn from(value: InstanceState) -> Self {
        match value {
            InstanceState::Starting => Self::Starting,
            InstanceState::Running => Self::Running,
            InstanceState::Stopping => Self::Stopping,
            InstanceState::Stopped
            | InstanceState::Destroying
            | InstanceState::Destroyed
            | InstanceState::Expunging => Self::Stopped,
            InstanceState::Migrating => Self::Paused,
            InstanceState::Error => Self::Error,
            InstanceState::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Paused => "Paused",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}
