//! Power, teardown, and query calls on an existing machine.

use std::net::SocketAddr;

use tracing::info;
use uuid::Uuid;

use crate::command::CommandRunner;
use crate::compute::{ApiFuture, ComputeApi, Operation};
use crate::error::DriverError;
use crate::state::RuntimeState;
use crate::ssh::deregister_key_pair;
use crate::wait::OperationWaiter;

use super::{DOCKER_PORT, Driver, MachineState};

const FALLBACK_SSH_USER: &str = "root";

/// Username conventions of common distributions, matched against the
/// lowercased image name.
const IMAGE_USERS: [(&str, &str); 6] = [
    ("ubuntu", "ubuntu"),
    ("centos", "centos"),
    ("redhat", "cloud-user"),
    ("fedora", "fedora"),
    ("coreos", "core"),
    ("debian", "debian"),
];

impl<A: ComputeApi, R: CommandRunner> Driver<A, R> {
    /// Powers the instance on and waits for the operation.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InstanceNotCreated`] before creation, or the
    /// platform failure.
    pub async fn start(&mut self) -> Result<(), DriverError> {
        self.power("start", |api, id| api.start_instance(id)).await
    }

    /// Powers the instance off and waits for the operation.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InstanceNotCreated`] before creation, or the
    /// platform failure.
    pub async fn stop(&mut self) -> Result<(), DriverError> {
        self.power("stop", |api, id| api.stop_instance(id)).await
    }

    /// Reboots the instance and waits for the operation.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InstanceNotCreated`] before creation, or the
    /// platform failure.
    pub async fn restart(&mut self) -> Result<(), DriverError> {
        self.power("reboot", |api, id| api.reboot_instance(id)).await
    }

    /// Stops the instance. The platform offers no harder power-off.
    ///
    /// # Errors
    ///
    /// Same as [`Driver::stop`].
    pub async fn kill(&mut self) -> Result<(), DriverError> {
        self.stop().await
    }

    /// Deletes the registered key pair and the instance, each waited.
    ///
    /// Security and anti-affinity groups are shared between machines and
    /// stay in place. With nothing recorded this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when a deletion fails. Fields of resources
    /// already deleted are cleared; the rest of the state is reset only once
    /// both deletions succeed.
    pub async fn remove(&mut self) -> Result<(), DriverError> {
        if self.state.is_empty() {
            info!(machine = %self.config.machine_name, "nothing to remove");
            return Ok(());
        }

        let api = self.session().await?;
        let waiter = OperationWaiter::new(&api).with_poll_interval(self.poll_interval);

        if let Some(key_pair) = self.state.key_pair.clone() {
            deregister_key_pair(&api, &waiter, &key_pair).await?;
            self.state.key_pair = None;
        }

        if let Some(id) = self.state.instance_id {
            let operation = api.delete_instance(id).await?;
            waiter.wait(operation).await?;
            info!(instance = %id, "deleted instance");
        }
        self.state = RuntimeState::default();

        info!("security and anti-affinity groups were not removed");
        Ok(())
    }

    /// Fetches the instance and maps its state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InstanceNotCreated`] before creation, or the
    /// platform failure.
    pub async fn machine_state(&self) -> Result<MachineState, DriverError> {
        let id = self.instance_id()?;
        let api = self.session().await?;
        let instance = api.get_instance(id).await?;
        Ok(MachineState::from(instance.state))
    }

    /// Returns the Docker endpoint `tcp://<ip>:2376`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotRunning`] unless the machine is running, and
    /// [`DriverError::MissingIpAddress`] when no address was recorded.
    pub async fn url(&self) -> Result<String, DriverError> {
        let state = self.machine_state().await?;
        if state != MachineState::Running {
            return Err(DriverError::NotRunning { state });
        }
        let address = self.state.ip_address.ok_or(DriverError::MissingIpAddress)?;
        Ok(format!("tcp://{}", SocketAddr::new(address, DOCKER_PORT)))
    }

    /// Returns the recorded public address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIpAddress`] when none was recorded.
    pub fn ssh_hostname(&self) -> Result<String, DriverError> {
        self.state
            .ip_address
            .map(|address| address.to_string())
            .ok_or(DriverError::MissingIpAddress)
    }

    /// Returns the username for SSH sessions.
    ///
    /// Prefers the template's default user recorded at creation, then the
    /// configured override, then a guess based on the image name.
    #[must_use]
    pub fn ssh_username(&self) -> String {
        if let Some(user) = self.state.ssh_user.as_deref().filter(|user| !user.is_empty()) {
            return user.to_owned();
        }
        if let Some(user) = self.config.ssh_user.as_deref().filter(|user| !user.is_empty()) {
            return user.to_owned();
        }
        let image = self.config.image.to_lowercase();
        IMAGE_USERS
            .iter()
            .find(|(needle, _)| image.contains(needle))
            .map_or(FALLBACK_SSH_USER, |(_, user)| *user)
            .to_owned()
    }

    async fn power<F>(&self, action: &str, call: F) -> Result<(), DriverError>
    where
        F: for<'a> FnOnce(&'a A, Uuid) -> ApiFuture<'a, Operation>,
    {
        let id = self.instance_id()?;
        let api = self.session().await?;
        let operation = call(&api, id).await?;
        OperationWaiter::new(&api)
            .with_poll_interval(self.poll_interval)
            .wait(operation)
            .await?;
        info!(instance = %id, action, "instance power action completed");
        Ok(())
    }
}
