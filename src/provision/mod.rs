//! Find-or-create provisioning of security and anti-affinity groups.
//!
//! Both `ensure_*` calls look the group up by name first and only create it
//! when missing. A creation that loses a race against another caller is
//! reported by the platform as a conflict, which is folded into
//! [`CreateOutcome::AlreadyExists`] and followed by one more lookup. There is
//! no locking across callers.

pub mod rules;

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::compute::{
    ApiError, ComputeApi, CreateAntiAffinityGroupRequest, CreateSecurityGroupRequest,
    ResourceKind, SecurityGroupRef,
};
use crate::error::DriverError;
use crate::finder::{find_anti_affinity_group, find_security_group};
use crate::wait::OperationWaiter;

use self::rules::baseline_rules;

/// Description attached to groups created by this crate.
pub const GROUP_DESCRIPTION: &str = "created by exomachine";
const PRIVATE_VISIBILITY: &str = "private";
const CONFLICT_REASON: &str = "conflict";

/// Result of a creation attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    /// The resource was created with this id.
    Created(Uuid),
    /// The platform reported that the resource already exists.
    AlreadyExists,
}

/// Ensures named groups exist, creating them when missing.
#[derive(Clone, Debug)]
pub struct Provisioner<'a, A> {
    api: &'a A,
    waiter: OperationWaiter<'a, A>,
}

impl<'a, A: ComputeApi> Provisioner<'a, A> {
    /// Creates a provisioner issuing calls through `api` and polling
    /// operations every `poll_interval`.
    #[must_use]
    pub const fn new(api: &'a A, poll_interval: Duration) -> Self {
        Self {
            api,
            waiter: OperationWaiter::new(api).with_poll_interval(poll_interval),
        }
    }

    /// Returns the id of the security group called `name`, creating it with
    /// the baseline rule set when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when a lookup, the creation, or any rule
    /// submission fails. Rules already added are left in place.
    pub async fn ensure_security_group(&self, name: &str) -> Result<Uuid, DriverError> {
        ensure_with(
            ResourceKind::SecurityGroup,
            name,
            || async move {
                let found = find_security_group(self.api, name).await?;
                Ok::<_, DriverError>(found.map(|group| group.id))
            },
            || self.create_security_group(name),
        )
        .await
    }

    /// Returns the id of the anti-affinity group called `name`, creating it
    /// when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the lookup or the creation fails.
    pub async fn ensure_anti_affinity_group(&self, name: &str) -> Result<Uuid, DriverError> {
        ensure_with(
            ResourceKind::AntiAffinityGroup,
            name,
            || async move {
                let found = find_anti_affinity_group(self.api, name).await?;
                Ok::<_, DriverError>(found.map(|group| group.id))
            },
            || self.create_anti_affinity_group(name),
        )
        .await
    }

    /// Creates a security group and applies the baseline rules to it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] for failures other than a creation conflict.
    pub async fn create_security_group(&self, name: &str) -> Result<CreateOutcome, DriverError> {
        let request = CreateSecurityGroupRequest {
            name: name.to_owned(),
            description: GROUP_DESCRIPTION.to_owned(),
        };
        let created = async {
            let operation = self.api.create_security_group(&request).await?;
            self.waiter.wait_for_id(operation).await
        }
        .await;
        let CreateOutcome::Created(id) = fold_conflict(created)? else {
            debug!(name, "security group already exists");
            return Ok(CreateOutcome::AlreadyExists);
        };
        info!(name, %id, "created security group");

        let source = SecurityGroupRef {
            id,
            name: name.to_owned(),
            visibility: PRIVATE_VISIBILITY.to_owned(),
        };
        for rule in baseline_rules(&source) {
            let operation = self.api.add_rule_to_security_group(id, &rule).await?;
            self.waiter.wait(operation).await?;
            debug!(
                name,
                description = rule.description.as_deref().unwrap_or_default(),
                start_port = rule.start_port,
                end_port = rule.end_port,
                "added security group rule"
            );
        }
        Ok(CreateOutcome::Created(id))
    }

    /// Creates an anti-affinity group.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] for failures other than a creation conflict.
    pub async fn create_anti_affinity_group(
        &self,
        name: &str,
    ) -> Result<CreateOutcome, DriverError> {
        let request = CreateAntiAffinityGroupRequest {
            name: name.to_owned(),
            description: GROUP_DESCRIPTION.to_owned(),
        };
        let created = async {
            let operation = self.api.create_anti_affinity_group(&request).await?;
            self.waiter.wait_for_id(operation).await
        }
        .await;
        let outcome = fold_conflict(created)?;
        if let CreateOutcome::Created(id) = outcome {
            info!(name, %id, "created anti-affinity group");
        }
        Ok(outcome)
    }
}

/// Looks a resource up, creates it when missing, and looks it up once more
/// when creation reports that it already exists.
async fn ensure_with<Find, FindFut, Create, CreateFut>(
    kind: ResourceKind,
    name: &str,
    find: Find,
    create: Create,
) -> Result<Uuid, DriverError>
where
    Find: Fn() -> FindFut,
    FindFut: Future<Output = Result<Option<Uuid>, DriverError>>,
    Create: FnOnce() -> CreateFut,
    CreateFut: Future<Output = Result<CreateOutcome, DriverError>>,
{
    if let Some(id) = find().await? {
        debug!(%kind, name, %id, "found existing group");
        return Ok(id);
    }

    match create().await? {
        CreateOutcome::Created(id) => Ok(id),
        CreateOutcome::AlreadyExists => {
            find()
                .await?
                .ok_or_else(|| DriverError::ResourceNotFound {
                    kind,
                    name: name.to_owned(),
                })
        }
    }
}

/// Maps platform conflicts to [`CreateOutcome::AlreadyExists`].
fn fold_conflict(result: Result<Uuid, DriverError>) -> Result<CreateOutcome, DriverError> {
    match result {
        Ok(id) => Ok(CreateOutcome::Created(id)),
        Err(DriverError::Api(ApiError::Conflict { .. })) => Ok(CreateOutcome::AlreadyExists),
        Err(DriverError::OperationFailed { reason, .. }) if reason == CONFLICT_REASON => {
            Ok(CreateOutcome::AlreadyExists)
        }
        Err(err) => Err(err),
    }
}
