//! Core library for exomachine, an Exoscale machine provisioner.
//!
//! The crate provisions a single virtual machine and manages its lifecycle:
//! it resolves the zone endpoint, looks up the template and instance type,
//! ensures the security and anti-affinity groups exist, prepares SSH access,
//! creates the instance, and then starts, stops, queries, and removes it.
//! Every platform mutation is an asynchronous operation that is polled to
//! completion before the next step runs.
//!
//! [`Driver`] holds the orchestration logic behind the [`ComputeApi`] trait,
//! which [`ExoscaleClient`] implements over HTTP and
//! [`test_support::FakeCompute`] implements in memory.

pub mod command;
pub mod compute;
pub mod config;
pub mod driver;
pub mod error;
pub mod exoscale;
pub mod finder;
pub mod paths;
pub mod provision;
pub mod session;
pub mod ssh;
pub mod state;
pub mod state_store;
pub mod test_support;
pub mod user_data;
pub mod wait;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use compute::{ApiError, ComputeApi, Credentials};
pub use config::{ConfigError, DiskSize, DriverConfig, ExoscaleConfig, SshKeySource};
pub use driver::{Driver, MachineDriver, MachineState};
pub use error::DriverError;
pub use exoscale::ExoscaleClient;
pub use provision::{CreateOutcome, Provisioner};
pub use state::RuntimeState;
pub use state_store::{StateStore, StateStoreError};
pub use wait::OperationWaiter;
