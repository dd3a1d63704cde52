//! Outbound contract with the compute platform.
//!
//! [`ComputeApi`] lists every call the orchestration logic issues. Mutating
//! calls return an [`Operation`] that callers poll with
//! [`crate::wait::OperationWaiter`]; read calls return resources directly.

mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

pub use error::ApiError;
pub use types::{
    AntiAffinityGroup, CreateAntiAffinityGroupRequest, CreateInstanceRequest,
    CreateSecurityGroupRequest, FlowDirection, IdRef, Instance, InstanceState, InstanceType,
    ListedRule, NameRef, Named, Operation, OperationState, Protocol, Reference,
    RegisterSshKeyRequest, ResourceKind, SecurityGroup, SecurityGroupRef, SecurityGroupRule,
    SshKey, Template, TemplateRef, Zone,
};

/// Future returned by compute API calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// API key pair used to sign requests.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Public API key.
    pub key: String,
    /// API secret used as the signing key.
    pub secret: String,
}

impl Credentials {
    /// Builds credentials from a key and secret.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Calls issued against the compute platform.
///
/// Implementations are cheap to clone; [`ComputeApi::with_endpoint`] returns
/// a copy bound to a zone's regional endpoint.
pub trait ComputeApi: Clone + Send + Sync {
    /// Returns a copy of the client that targets `endpoint`.
    #[must_use]
    fn with_endpoint(&self, endpoint: &str) -> Self;

    /// Lists availability zones.
    fn list_zones(&self) -> ApiFuture<'_, Vec<Zone>>;

    /// Lists public templates.
    fn list_templates(&self) -> ApiFuture<'_, Vec<Template>>;

    /// Lists instance types.
    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceType>>;

    /// Lists security groups owned by the caller.
    fn list_security_groups(&self) -> ApiFuture<'_, Vec<SecurityGroup>>;

    /// Creates a security group.
    fn create_security_group<'a>(
        &'a self,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, Operation>;

    /// Adds one rule to a security group.
    fn add_rule_to_security_group<'a>(
        &'a self,
        security_group_id: Uuid,
        rule: &'a SecurityGroupRule,
    ) -> ApiFuture<'a, Operation>;

    /// Lists anti-affinity groups owned by the caller.
    fn list_anti_affinity_groups(&self) -> ApiFuture<'_, Vec<AntiAffinityGroup>>;

    /// Creates an anti-affinity group.
    fn create_anti_affinity_group<'a>(
        &'a self,
        request: &'a CreateAntiAffinityGroupRequest,
    ) -> ApiFuture<'a, Operation>;

    /// Registers an SSH public key.
    fn register_ssh_key<'a>(
        &'a self,
        request: &'a RegisterSshKeyRequest,
    ) -> ApiFuture<'a, Operation>;

    /// Fetches a registered SSH key by name.
    fn get_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, SshKey>;

    /// Deregisters an SSH key by name.
    fn delete_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation>;

    /// Creates an instance.
    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ApiFuture<'a, Operation>;

    /// Fetches an instance by id.
    fn get_instance(&self, id: Uuid) -> ApiFuture<'_, Instance>;

    /// Powers an instance on.
    fn start_instance(&self, id: Uuid) -> ApiFuture<'_, Operation>;

    /// Powers an instance off.
    fn stop_instance(&self, id: Uuid) -> ApiFuture<'_, Operation>;

    /// Reboots an instance.
    fn reboot_instance(&self, id: Uuid) -> ApiFuture<'_, Operation>;

    /// Deletes an instance.
    fn delete_instance(&self, id: Uuid) -> ApiFuture<'_, Operation>;

    /// Reveals the initial password of an instance.
    fn reveal_instance_password(&self, id: Uuid) -> ApiFuture<'_, String>;

    /// Fetches the current state of an operation.
    fn get_operation(&self, id: Uuid) -> ApiFuture<'_, Operation>;
}
