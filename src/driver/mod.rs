//! Machine lifecycle orchestration.
//!
//! A [`Driver`] pairs the immutable [`DriverConfig`] of one machine with the
//! [`RuntimeState`] learnt while provisioning it. Every call resolves a
//! zone-bound session first, then issues its platform calls one after the
//! other, waiting for each mutation to finish before moving on. Nothing is
//! rolled back when a step fails.

mod create;
mod lifecycle;
mod state;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use uuid::Uuid;

use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::compute::ComputeApi;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::session;
use crate::state::RuntimeState;
use crate::wait::DEFAULT_POLL_INTERVAL;

pub use state::MachineState;

/// TCP port probed to decide whether SSH is reachable.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// TCP port of the Docker daemon advertised by [`Driver::url`].
pub const DOCKER_PORT: u16 = 2376;
/// Default upper bound on the wait for SSH after creation.
pub const DEFAULT_SSH_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_SSH_PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// Future returned by [`MachineDriver`] calls.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Lifecycle calls a host issues against one machine.
pub trait MachineDriver {
    /// Provisions the machine and its dependencies.
    fn create(&mut self) -> DriverFuture<'_, ()>;
    /// Powers the machine on.
    fn start(&mut self) -> DriverFuture<'_, ()>;
    /// Powers the machine off.
    fn stop(&mut self) -> DriverFuture<'_, ()>;
    /// Reboots the machine.
    fn restart(&mut self) -> DriverFuture<'_, ()>;
    /// Forcibly powers the machine off.
    fn kill(&mut self) -> DriverFuture<'_, ()>;
    /// Deletes the machine and its temporary key pair.
    fn remove(&mut self) -> DriverFuture<'_, ()>;
    /// Reports the current machine state.
    fn machine_state(&self) -> DriverFuture<'_, MachineState>;
    /// Returns the Docker endpoint of a running machine.
    fn url(&self) -> DriverFuture<'_, String>;
    /// Returns the host name to open SSH connections to.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIpAddress`] before creation.
    fn ssh_hostname(&self) -> Result<String, DriverError>;
    /// Returns the username to open SSH connections with.
    fn ssh_username(&self) -> String;
}

/// Orchestrates the lifecycle of one machine.
#[derive(Clone, Debug)]
pub struct Driver<A, R = ProcessCommandRunner> {
    config: DriverConfig,
    state: RuntimeState,
    api: A,
    runner: R,
    poll_interval: Duration,
    ssh_port: u16,
    ssh_wait_timeout: Duration,
    ssh_probe_interval: Duration,
}

impl<A: ComputeApi> Driver<A> {
    /// Creates a driver for a machine that has not been provisioned yet.
    ///
    /// `api` is the credentialed client bound to the global endpoint; each
    /// call rebinds it to the configured zone.
    #[must_use]
    pub fn new(config: DriverConfig, api: A) -> Self {
        Self {
            config,
            state: RuntimeState::default(),
            api,
            runner: ProcessCommandRunner,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ssh_port: DEFAULT_SSH_PORT,
            ssh_wait_timeout: DEFAULT_SSH_WAIT_TIMEOUT,
            ssh_probe_interval: DEFAULT_SSH_PROBE_INTERVAL,
        }
    }
}

impl<A: ComputeApi, R: CommandRunner> Driver<A, R> {
    /// Replaces the runner used to invoke `ssh-keygen`.
    #[must_use]
    pub fn with_runner<R2: CommandRunner>(self, runner: R2) -> Driver<A, R2> {
        Driver {
            config: self.config,
            state: self.state,
            api: self.api,
            runner,
            poll_interval: self.poll_interval,
            ssh_port: self.ssh_port,
            ssh_wait_timeout: self.ssh_wait_timeout,
            ssh_probe_interval: self.ssh_probe_interval,
        }
    }

    /// Restores runtime state persisted by the host.
    #[must_use]
    pub fn with_state(mut self, state: RuntimeState) -> Self {
        self.state = state;
        self
    }

    /// Overrides the delay between operation polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.ssh_probe_interval = poll_interval;
        self
    }

    /// Overrides the port probed for SSH reachability.
    #[must_use]
    pub const fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Overrides the upper bound on the SSH reachability wait.
    #[must_use]
    pub const fn with_ssh_wait_timeout(mut self, timeout: Duration) -> Self {
        self.ssh_wait_timeout = timeout;
        self
    }

    /// Returns the machine configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the runtime state for the host to persist.
    #[must_use]
    pub const fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// Consumes the driver and returns its runtime state.
    #[must_use]
    pub fn into_state(self) -> RuntimeState {
        self.state
    }

    async fn session(&self) -> Result<A, DriverError> {
        session::resolve(&self.api, &self.config.zone).await
    }

    fn instance_id(&self) -> Result<Uuid, DriverError> {
        self.state.instance_id.ok_or(DriverError::InstanceNotCreated)
    }
}

impl<A, R> MachineDriver for Driver<A, R>
where
    A: ComputeApi,
    R: CommandRunner + Send + Sync,
{
    fn create(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::create(self))
    }

    fn start(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::start(self))
    }

    fn stop(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::stop(self))
    }

    fn restart(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::restart(self))
    }

    fn kill(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::kill(self))
    }

    fn remove(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(Self::remove(self))
    }

    fn machine_state(&self) -> DriverFuture<'_, MachineState> {
        Box::pin(Self::machine_state(self))
    }

    fn url(&self) -> DriverFuture<'_, String> {
        Box::pin(Self::url(self))
    }

    fn ssh_hostname(&self) -> Result<String, DriverError> {
        Self::ssh_hostname(self)
    }

    fn ssh_username(&self) -> String {
        Self::ssh_username(self)
    }
}
