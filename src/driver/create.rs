//! Machine creation.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::command::CommandRunner;
use crate::compute::{ComputeApi, CreateInstanceRequest, IdRef, NameRef, ResourceKind};
use crate::config::SshKeySource;
use crate::error::DriverError;
use crate::finder::{find_ssh_key, resolve_instance_type, resolve_template};
use crate::provision::Provisioner;
use crate::ssh::{
    deregister_key_pair, generate_key_pair, import_key_pair, key_pair_name, register_key_pair,
};
use crate::user_data::{append_authorized_key, encode, load_user_data};
use crate::wait::OperationWaiter;

use super::Driver;

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

impl<A: ComputeApi, R: CommandRunner> Driver<A, R> {
    /// Provisions the machine.
    ///
    /// Resolves the template and instance type, ensures every configured
    /// group exists, prepares SSH credentials, then creates the instance and
    /// records its id, address, and password. A generated key pair is
    /// deregistered once SSH answers.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] on the first failing step. Resources created
    /// by earlier steps are left in place.
    pub async fn create(&mut self) -> Result<(), DriverError> {
        let mut user_data = load_user_data(self.config.user_data_path.as_deref())?;
        let api = self.session().await?;
        let waiter = OperationWaiter::new(&api).with_poll_interval(self.poll_interval);

        let template = resolve_template(&api, &self.config.image).await?;
        if let Some(user) = template.default_user.as_deref().filter(|user| !user.is_empty()) {
            self.state.ssh_user = Some(user.to_owned());
        }
        let instance_type = resolve_instance_type(&api, &self.config.instance_type).await?;

        let provisioner = Provisioner::new(&api, self.poll_interval);
        let mut security_groups = Vec::new();
        for name in self.config.security_groups.iter().filter(|name| !name.is_empty()) {
            let id = provisioner.ensure_security_group(name).await?;
            debug!(name = %name, %id, "using security group");
            security_groups.push(IdRef { id });
        }
        let mut anti_affinity_groups = Vec::new();
        for name in self
            .config
            .anti_affinity_groups
            .iter()
            .filter(|name| !name.is_empty())
        {
            let id = provisioner.ensure_anti_affinity_group(name).await?;
            debug!(name = %name, %id, "using anti-affinity group");
            anti_affinity_groups.push(IdRef { id });
        }

        let ssh_keys = self.prepare_ssh_key(&api, &waiter, &mut user_data).await?;

        info!(machine = %self.config.machine_name, "spawning instance");
        debug!(user_data = %user_data, "cloud-init user data");
        let request = CreateInstanceRequest {
            name: self.config.machine_name.clone(),
            template: IdRef { id: template.id },
            instance_type: IdRef {
                id: instance_type.id,
            },
            disk_size: self.config.disk_size.gib(),
            ipv6_enabled: true,
            user_data: encode(&user_data),
            ssh_keys,
            security_groups,
            anti_affinity_groups,
        };
        let operation = api.create_instance(&request).await?;
        let created_id = waiter.wait_for_id(operation).await?;
        let instance = api.get_instance(created_id).await?;

        self.state.instance_id = Some(instance.id);
        self.state.ip_address = instance.public_ip;
        info!(
            instance = %instance.id,
            ip = ?self.state.ip_address,
            ssh_user = %self.ssh_username(),
            "instance deployed"
        );

        let password_enabled = instance
            .template
            .as_ref()
            .and_then(|reference| reference.password_enabled)
            .unwrap_or(false);
        if password_enabled {
            let password = api.reveal_instance_password(instance.id).await?;
            self.state.password = Some(password);
        }

        if let Some(key_pair) = self.state.key_pair.clone() {
            let address = self.state.ip_address.ok_or(DriverError::MissingIpAddress)?;
            self.wait_for_ssh(address).await?;
            deregister_key_pair(&api, &waiter, &key_pair).await?;
            self.state.key_pair = None;
        }
        Ok(())
    }

    /// Prepares credentials and returns the registered keys to attach.
    async fn prepare_ssh_key(
        &mut self,
        api: &A,
        waiter: &OperationWaiter<'_, A>,
        user_data: &mut String,
    ) -> Result<Vec<NameRef>, DriverError> {
        match &self.config.ssh_key {
            SshKeySource::Import(source) => {
                info!(source = %source, "importing SSH key");
                let public_key = import_key_pair(source, &self.config.store_path)?;
                append_authorized_key(user_data, &public_key);
                Ok(Vec::new())
            }
            SshKeySource::Generate => {
                let name = key_pair_name(&self.config.machine_name);
                info!(name = %name, "generating SSH key pair");
                let public_key = generate_key_pair(&self.runner, &self.config.store_path, &name)?;
                register_key_pair(api, waiter, &name, &public_key).await?;
                self.state.key_pair = Some(name.clone());
                let key = find_ssh_key(api, &name)
                    .await?
                    .ok_or(DriverError::ResourceNotFound {
                        kind: ResourceKind::SshKey,
                        name,
                    })?;
                Ok(vec![NameRef { name: key.name }])
            }
        }
    }

    async fn wait_for_ssh(&self, address: IpAddr) -> Result<(), DriverError> {
        let target = SocketAddr::new(address, self.ssh_port);
        let deadline = Instant::now() + self.ssh_wait_timeout;
        while Instant::now() <= deadline {
            let connect = timeout(SSH_CONNECT_TIMEOUT, TcpStream::connect(target)).await;
            if matches!(connect, Ok(Ok(_))) {
                debug!(%target, "SSH is reachable");
                return Ok(());
            }
            sleep(self.ssh_probe_interval).await;
        }

        Err(DriverError::SshUnreachable {
            address: target.to_string(),
        })
    }
}
