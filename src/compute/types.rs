//! Resource types exchanged with the compute platform.
//!
//! Field names follow the platform's kebab-case JSON representation so the
//! same types serve the HTTP client and the in-memory test double.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human-facing category of a platform resource, used in lookup errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// Bootable OS image.
    Template,
    /// Instance size (CPU and memory profile).
    InstanceType,
    /// Named firewall rule set.
    SecurityGroup,
    /// Placement constraint keeping members on distinct hosts.
    AntiAffinityGroup,
    /// Registered SSH public key.
    SshKey,
    /// Compute instance.
    Instance,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Template => "template",
            Self::InstanceType => "instance type",
            Self::SecurityGroup => "security group",
            Self::AntiAffinityGroup => "anti-affinity group",
            Self::SshKey => "SSH key",
            Self::Instance => "instance",
        };
        f.write_str(label)
    }
}

/// Resources that can be looked up by name or identifier.
pub trait Named {
    /// Platform identifier rendered as a string.
    fn id_string(&self) -> String;
    /// Human-readable name.
    fn name(&self) -> &str;
}

/// Availability zone and its regional API endpoint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Zone {
    /// Zone name, for example `ch-dk-2`.
    pub name: String,
    /// Base URL of the zone's API, for example `https://api-ch-dk-2.exoscale.com/v2`.
    pub api_endpoint: String,
}

/// Bootable image template.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Template {
    /// Template identifier.
    pub id: Uuid,
    /// Display name, for example `Linux Ubuntu 24.04 LTS 64-bit`.
    pub name: String,
    /// Root disk footprint in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Login user baked into the image, when declared.
    #[serde(default)]
    pub default_user: Option<String>,
    /// Whether the image boots with a one-time password login.
    #[serde(default)]
    pub password_enabled: Option<bool>,
}

impl Named for Template {
    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Instance size offered by the platform.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstanceType {
    /// Instance type identifier.
    pub id: Uuid,
    /// Family, for example `standard`.
    #[serde(default)]
    pub family: String,
    /// Size within the family, for example `small`.
    #[serde(default)]
    pub size: String,
}

impl InstanceType {
    /// Returns the `family.size` composite key.
    #[must_use]
    pub fn composite_key(&self) -> String {
        format!("{}.{}", self.family, self.size)
    }
}

/// Security group and its rules.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityGroup {
    /// Security group identifier.
    pub id: Uuid,
    /// Security group name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Rules in platform order.
    #[serde(default)]
    pub rules: Vec<ListedRule>,
}

impl Named for SecurityGroup {
    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Anti-affinity (placement) group.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AntiAffinityGroup {
    /// Group identifier.
    pub id: Uuid,
    /// Group name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Named for AntiAffinityGroup {
    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registered SSH key; the name is its identity.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SshKey {
    /// Key name.
    pub name: String,
    /// Key fingerprint reported by the platform.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Named for SshKey {
    fn id_string(&self) -> String {
        self.name.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Lifecycle state reported by the platform for an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    /// Booting.
    Starting,
    /// Powered on.
    Running,
    /// Shutting down.
    Stopping,
    /// Powered off.
    Stopped,
    /// Deletion in progress.
    Destroying,
    /// Deleted.
    Destroyed,
    /// Being purged after deletion.
    Expunging,
    /// Moving between hosts.
    Migrating,
    /// Failed.
    Error,
    /// Any state this crate does not recognise.
    #[serde(other)]
    Unknown,
}

/// Reference to the template an instance was built from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemplateRef {
    /// Template identifier.
    pub id: Uuid,
    /// Password login flag, when the platform embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_enabled: Option<bool>,
}

/// Compute instance as reported by the platform.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Instance {
    /// Instance identifier.
    pub id: Uuid,
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Public address, once assigned.
    #[serde(default)]
    pub public_ip: Option<IpAddr>,
    /// Template used to build the instance.
    #[serde(default)]
    pub template: Option<TemplateRef>,
}

/// Progress of an asynchronous platform mutation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationState {
    /// Accepted, not started.
    Pending,
    /// In progress.
    Processing,
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Failure,
    /// Abandoned by the platform.
    Timeout,
    /// Any state this crate does not recognise.
    #[serde(other)]
    Unknown,
}

impl OperationState {
    /// Returns `true` while the operation may still change state.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Resource produced or acted on by an operation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Reference {
    /// Resource identifier, when the resource has one.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// API link to the resource.
    #[serde(default)]
    pub link: Option<String>,
    /// Command that produced the operation.
    #[serde(default)]
    pub command: Option<String>,
}

/// Handle returned by every mutating call.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Operation {
    /// Operation identifier.
    pub id: Uuid,
    /// Current state.
    pub state: OperationState,
    /// Machine-readable failure reason, for example `conflict`.
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable failure detail.
    #[serde(default)]
    pub message: Option<String>,
    /// Resource the operation produced or acted on.
    #[serde(default)]
    pub reference: Option<Reference>,
}

/// Transport protocol of a firewall rule.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    /// Wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Direction a rule applies to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    /// Incoming traffic.
    Ingress,
    /// Outgoing traffic.
    Egress,
}

/// Reference to a security group used as a rule source.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityGroupRef {
    /// Security group identifier.
    pub id: Uuid,
    /// Security group name.
    pub name: String,
    /// Visibility of the group, `private` for groups owned by the caller.
    #[serde(default)]
    pub visibility: String,
}

/// Firewall rule submitted when adding rules to a group.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityGroupRule {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Direction of the traffic.
    pub flow_direction: FlowDirection,
    /// Transport protocol.
    pub protocol: Protocol,
    /// First port of the range.
    pub start_port: u16,
    /// Last port of the range (inclusive).
    pub end_port: u16,
    /// Source CIDR block, for network-sourced rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Source security group, for group-sourced rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroupRef>,
}

/// Firewall rule as listed by the platform.
///
/// Listings cover every group in the account, so any protocol may appear and
/// port bounds are absent for protocols such as ICMP.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListedRule {
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Direction of the traffic.
    #[serde(default)]
    pub flow_direction: Option<FlowDirection>,
    /// Protocol name as reported, for example `tcp` or `icmp`.
    pub protocol: String,
    /// First port of the range.
    #[serde(default)]
    pub start_port: Option<u16>,
    /// Last port of the range (inclusive).
    #[serde(default)]
    pub end_port: Option<u16>,
    /// Source CIDR block, for network-sourced rules.
    #[serde(default)]
    pub network: Option<String>,
    /// Source security group, for group-sourced rules.
    #[serde(default)]
    pub security_group: Option<SecurityGroupRef>,
}

impl From<&SecurityGroupRule> for ListedRule {
    fn from(rule: &SecurityGroupRule) -> Self {
        Self {
            description: rule.description.clone(),
            flow_direction: Some(rule.flow_direction),
            protocol: rule.protocol.as_str().to_owned(),
            start_port: Some(rule.start_port),
            end_port: Some(rule.end_port),
            network: rule.network.clone(),
            security_group: rule.security_group.clone(),
        }
    }
}

/// Payload for creating a security group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateSecurityGroupRequest {
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Payload for creating an anti-affinity group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateAntiAffinityGroupRequest {
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Payload for registering an SSH public key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterSshKeyRequest {
    /// Key name.
    pub name: String,
    /// OpenSSH-formatted public key.
    pub public_key: String,
}

/// Identifier wrapper used in creation payloads.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IdRef {
    /// Referenced identifier.
    pub id: Uuid,
}

/// Name wrapper used to reference SSH keys in creation payloads.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NameRef {
    /// Referenced name.
    pub name: String,
}

/// Payload for creating an instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Template to boot.
    pub template: IdRef,
    /// Instance size.
    pub instance_type: IdRef,
    /// Root disk size in GiB.
    pub disk_size: u32,
    /// Whether to assign an IPv6 address alongside IPv4.
    pub ipv6_enabled: bool,
    /// Base64-encoded cloud-init payload.
    pub user_data: String,
    /// SSH keys to install at first boot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<NameRef>,
    /// Security groups to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<IdRef>,
    /// Anti-affinity groups to join.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anti_affinity_groups: Vec<IdRef>,
}
