//! Error type returned by provisioning and lifecycle calls.

use thiserror::Error;
use uuid::Uuid;

use crate::compute::{ApiError, ResourceKind};
use crate::config::ConfigError;
use crate::driver::MachineState;
use crate::ssh::SshKeyError;
use crate::user_data::UserDataError;

/// Errors raised while provisioning or managing a machine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised when configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Raised when the configured zone is not offered by the platform.
    #[error("configuration error: unknown zone `{zone}`")]
    UnknownZone {
        /// Zone name that was requested.
        zone: String,
    },
    /// Raised when user-data cannot be loaded.
    #[error("configuration error: {0}")]
    UserData(#[from] UserDataError),
    /// Raised when SSH credentials cannot be prepared.
    #[error("configuration error: {0}")]
    SshKey(#[from] SshKeyError),
    /// Raised when a named resource does not exist.
    #[error("unable to find {kind} `{name}`")]
    ResourceNotFound {
        /// Kind of resource that was looked up.
        kind: ResourceKind,
        /// Requested name or identifier.
        name: String,
    },
    /// Raised when a lookup matches more than one resource.
    #[error("{kind} `{name}` is ambiguous: {count} matches")]
    AmbiguousResource {
        /// Kind of resource that was looked up.
        kind: ResourceKind,
        /// Requested name or identifier.
        name: String,
        /// Number of matching resources.
        count: usize,
    },
    /// Raised when an asynchronous operation ends without success.
    #[error("operation {operation_id} failed: {reason}: {message}")]
    OperationFailed {
        /// Identifier of the failed operation.
        operation_id: Uuid,
        /// Machine-readable reason reported by the platform.
        reason: String,
        /// Human-readable message reported by the platform.
        message: String,
    },
    /// Raised when an operation succeeds without naming the resource it
    /// produced.
    #[error("operation {operation_id} did not reference a resource")]
    MissingReference {
        /// Identifier of the operation.
        operation_id: Uuid,
    },
    /// Raised for transport and HTTP failures.
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    /// Raised when a call requires a running machine.
    #[error("machine is not running (state: {state})")]
    NotRunning {
        /// State observed instead.
        state: MachineState,
    },
    /// Raised when a call needs an instance but none has been created.
    #[error("no instance has been created for this machine")]
    InstanceNotCreated,
    /// Raised when the instance has no public address.
    #[error("instance has no public IP address")]
    MissingIpAddress,
    /// Raised when SSH never became reachable.
    #[error("SSH on {address} did not become reachable")]
    SshUnreachable {
        /// Address that was probed.
        address: String,
    },
}
