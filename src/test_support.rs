//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCompute`] is an in-memory [`ComputeApi`] that records every call,
//! completes operations after a configurable number of polls, and can be
//! told to fail or to report creation conflicts. [`ScriptedRunner`] replays
//! queued command outputs.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use uuid::Uuid;

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::compute::{
    AntiAffinityGroup, ApiError, ApiFuture, ComputeApi, CreateAntiAffinityGroupRequest,
    CreateInstanceRequest, CreateSecurityGroupRequest, Instance, InstanceState, InstanceType,
    ListedRule, Operation, OperationState, Reference, RegisterSshKeyRequest, SecurityGroup,
    SecurityGroupRule, SshKey, Template, TemplateRef, Zone,
};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// How [`FakeCompute`] reports a lost creation race.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConflictStyle {
    /// The creation call itself fails with HTTP 409.
    Http,
    /// The creation call succeeds but its operation fails with reason
    /// `conflict`.
    Operation,
}

#[derive(Debug)]
struct ScriptedOperation {
    remaining_polls: usize,
    outcome: Operation,
}

#[derive(Debug)]
struct FakeState {
    zones: Vec<Zone>,
    templates: Vec<Template>,
    instance_types: Vec<InstanceType>,
    security_groups: Vec<SecurityGroup>,
    anti_affinity_groups: Vec<AntiAffinityGroup>,
    ssh_keys: Vec<RegisterSshKeyRequest>,
    instances: Vec<Instance>,
    operations: HashMap<Uuid, ScriptedOperation>,
    calls: Vec<String>,
    rules: Vec<(Uuid, SecurityGroupRule)>,
    instance_requests: Vec<CreateInstanceRequest>,
    failures: HashMap<String, ApiError>,
    security_group_race: Option<ConflictStyle>,
    anti_affinity_group_race: Option<ConflictStyle>,
    pending_polls: usize,
    operation_polls: usize,
    public_ip: Option<IpAddr>,
    password: String,
}

impl FakeState {
    fn seeded() -> Self {
        Self {
            zones: ["ch-dk-2", "ch-gva-2", "de-fra-1", "at-vie-1"]
                .into_iter()
                .map(|name| Zone {
                    name: name.to_owned(),
                    api_endpoint: format!("https://api-{name}.exoscale.com/v2"),
                })
                .collect(),
            templates: vec![
                fake_template("Linux Ubuntu 24.04 LTS 64-bit", 20, Some("ubuntu"), false),
                fake_template("Linux Ubuntu 24.04 LTS 64-bit", 10, Some("ubuntu"), false),
                fake_template("Linux Debian 12 (Bookworm) 64-bit", 10, Some("debian"), false),
                fake_template("Linux CentOS Stream 9 64-bit", 10, None, true),
            ],
            instance_types: [
                ("standard", "tiny"),
                ("standard", "small"),
                ("standard", "medium"),
                ("cpu", "small"),
            ]
            .into_iter()
            .map(|(family, size)| InstanceType {
                id: Uuid::new_v4(),
                family: family.to_owned(),
                size: size.to_owned(),
            })
            .collect(),
            security_groups: Vec::new(),
            anti_affinity_groups: Vec::new(),
            ssh_keys: Vec::new(),
            instances: Vec::new(),
            operations: HashMap::new(),
            calls: Vec::new(),
            rules: Vec::new(),
            instance_requests: Vec::new(),
            failures: HashMap::new(),
            security_group_race: None,
            anti_affinity_group_race: None,
            pending_polls: 0,
            operation_polls: 0,
            public_ip: Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))),
            password: String::from("s3cr3t-pa55"),
        }
    }

    fn operation(&mut self, reference: Option<Uuid>) -> Operation {
        let polls = self.pending_polls;
        self.scripted(polls, OperationState::Success, None, reference)
    }

    fn failed_operation(&mut self, reason: &str) -> Operation {
        let polls = self.pending_polls;
        self.scripted(polls, OperationState::Failure, Some(reason), None)
    }

    fn scripted(
        &mut self,
        polls: usize,
        outcome: OperationState,
        reason: Option<&str>,
        reference: Option<Uuid>,
    ) -> Operation {
        let id = Uuid::new_v4();
        let finished = Operation {
            id,
            state: outcome,
            reason: reason.map(str::to_owned),
            message: reason.map(|value| format!("scripted {value}")),
            reference: reference.map(|value| Reference {
                id: Some(value),
                link: None,
                command: None,
            }),
        };
        if polls == 0 {
            self.operations.insert(
                id,
                ScriptedOperation {
                    remaining_polls: 0,
                    outcome: finished.clone(),
                },
            );
            return finished;
        }
        self.operations.insert(
            id,
            ScriptedOperation {
                remaining_polls: polls,
                outcome: finished,
            },
        );
        Operation {
            id,
            state: OperationState::Pending,
            reason: None,
            message: None,
            reference: None,
        }
    }

    fn instance_mut(&mut self, id: Uuid) -> Result<&mut Instance, ApiError> {
        self.instances
            .iter_mut()
            .find(|instance| instance.id == id)
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("instance/{id}"),
            })
    }

    fn transition(&mut self, id: Uuid, state: InstanceState) -> Result<Operation, ApiError> {
        self.instance_mut(id)?.state = state;
        Ok(self.operation(Some(id)))
    }
}

fn fake_template(
    name: &str,
    gib: u64,
    default_user: Option<&str>,
    password_enabled: bool,
) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        size: Some(gib << 30),
        default_user: default_user.map(str::to_owned),
        password_enabled: Some(password_enabled),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory compute platform.
///
/// Clones share state; [`ComputeApi::with_endpoint`] returns a clone that
/// remembers the endpoint it was bound to.
#[derive(Clone, Debug)]
pub struct FakeCompute {
    state: Arc<Mutex<FakeState>>,
    endpoint: Option<String>,
}

impl Default for FakeCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCompute {
    /// Creates a platform seeded with zones, templates, and instance types.
    ///
    /// Seeded templates: Ubuntu 24.04 (user `ubuntu`), Debian 12 (user
    /// `debian`), and CentOS Stream 9 (no default user, password login).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::seeded())),
            endpoint: None,
        }
    }

    /// Returns the endpoint this handle is bound to.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint.clone()
    }

    /// Makes every subsequent operation stay pending for `polls` polls.
    pub fn set_pending_polls(&self, polls: usize) {
        lock(&self.state).pending_polls = polls;
    }

    /// Sets the public address assigned to new instances.
    pub fn set_public_ip(&self, address: Option<IpAddr>) {
        lock(&self.state).public_ip = address;
    }

    /// Makes the next call named `call` fail with `error`.
    pub fn fail_next(&self, call: &str, error: ApiError) {
        lock(&self.state).failures.insert(call.to_owned(), error);
    }

    /// Makes the next security group creation lose a race: the group appears
    /// as if another caller created it and the creation reports a conflict.
    pub fn race_next_security_group(&self, style: ConflictStyle) {
        lock(&self.state).security_group_race = Some(style);
    }

    /// Makes the next anti-affinity group creation lose a race.
    pub fn race_next_anti_affinity_group(&self, style: ConflictStyle) {
        lock(&self.state).anti_affinity_group_race = Some(style);
    }

    /// Adds a template.
    pub fn push_template(&self, template: Template) {
        lock(&self.state).templates.push(template);
    }

    /// Adds an existing security group and returns its id.
    pub fn push_security_group(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state).security_groups.push(SecurityGroup {
            id,
            name: name.to_owned(),
            description: None,
            rules: Vec::new(),
        });
        id
    }

    /// Adds an existing anti-affinity group and returns its id.
    pub fn push_anti_affinity_group(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.state)
            .anti_affinity_groups
            .push(AntiAffinityGroup {
                id,
                name: name.to_owned(),
                description: None,
            });
        id
    }

    /// Overrides the state of a stored instance.
    pub fn set_instance_state(&self, id: Uuid, state: InstanceState) {
        if let Ok(instance) = lock(&self.state).instance_mut(id) {
            instance.state = state;
        }
    }

    /// Registers an operation that completes with `outcome` after `polls`
    /// polls, referencing `reference` on success.
    #[must_use]
    pub fn scripted_operation(
        &self,
        polls: usize,
        outcome: OperationState,
        reference: Option<Uuid>,
    ) -> Operation {
        lock(&self.state).scripted(polls, outcome, None, reference)
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Returns how many times `call` was made.
    #[must_use]
    pub fn call_count(&self, call: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|recorded| recorded.as_str() == call)
            .count()
    }

    /// Returns the number of `get_operation` polls.
    #[must_use]
    pub fn operation_polls(&self) -> usize {
        lock(&self.state).operation_polls
    }

    /// Returns the rules added, with the id of their security group.
    #[must_use]
    pub fn rules(&self) -> Vec<(Uuid, SecurityGroupRule)> {
        lock(&self.state).rules.clone()
    }

    /// Returns the instance creation payloads received.
    #[must_use]
    pub fn instance_requests(&self) -> Vec<CreateInstanceRequest> {
        lock(&self.state).instance_requests.clone()
    }

    /// Returns the security groups currently stored.
    #[must_use]
    pub fn security_groups(&self) -> Vec<SecurityGroup> {
        lock(&self.state).security_groups.clone()
    }

    /// Returns the anti-affinity groups currently stored.
    #[must_use]
    pub fn anti_affinity_groups(&self) -> Vec<AntiAffinityGroup> {
        lock(&self.state).anti_affinity_groups.clone()
    }

    /// Returns the names of the currently registered SSH keys.
    #[must_use]
    pub fn ssh_key_names(&self) -> Vec<String> {
        lock(&self.state)
            .ssh_keys
            .iter()
            .map(|key| key.name.clone())
            .collect()
    }

    /// Returns the instances currently stored.
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> {
        lock(&self.state).instances.clone()
    }

    fn call<T>(
        &self,
        name: &str,
        action: impl FnOnce(&mut FakeState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = lock(&self.state);
        state.calls.push(name.to_owned());
        if let Some(error) = state.failures.remove(name) {
            return Err(error);
        }
        action(&mut *state)
    }

    fn respond<T: Send + 'static>(
        &self,
        name: &str,
        action: impl FnOnce(&mut FakeState) -> Result<T, ApiError>,
    ) -> ApiFuture<'_, T> {
        let result = self.call(name, action);
        Box::pin(std::future::ready(result))
    }
}

impl ComputeApi for FakeCompute {
    fn with_endpoint(&self, endpoint: &str) -> Self {
        Self {
            state: Arc::clone(&self.state),
            endpoint: Some(endpoint.to_owned()),
        }
    }

    fn list_zones(&self) -> ApiFuture<'_, Vec<Zone>> {
        self.respond("list_zones", |state| Ok(state.zones.clone()))
    }

    fn list_templates(&self) -> ApiFuture<'_, Vec<Template>> {
        self.respond("list_templates", |state| Ok(state.templates.clone()))
    }

    fn list_instance_types(&self) -> ApiFuture<'_, Vec<InstanceType>> {
        self.respond("list_instance_types", |state| {
            Ok(state.instance_types.clone())
        })
    }

    fn list_security_groups(&self) -> ApiFuture<'_, Vec<SecurityGroup>> {
        self.respond("list_security_groups", |state| {
            Ok(state.security_groups.clone())
        })
    }

    fn create_security_group<'a>(
        &'a self,
        request: &'a CreateSecurityGroupRequest,
    ) -> ApiFuture<'a, Operation> {
        self.respond("create_security_group", |state| {
            let id = Uuid::new_v4();
            state.security_groups.push(SecurityGroup {
                id,
                name: request.name.clone(),
                description: Some(request.description.clone()),
                rules: Vec::new(),
            });
            match state.security_group_race.take() {
                Some(ConflictStyle::Http) => Err(ApiError::Conflict {
                    message: format!("security group {} already exists", request.name),
                }),
                Some(ConflictStyle::Operation) => Ok(state.failed_operation("conflict")),
                None => Ok(state.operation(Some(id))),
            }
        })
    }

    fn add_rule_to_security_group<'a>(
        &'a self,
        security_group_id: Uuid,
        rule: &'a SecurityGroupRule,
    ) -> ApiFuture<'a, Operation> {
        self.respond("add_rule_to_security_group", |state| {
            let group = state
                .security_groups
                .iter_mut()
                .find(|group| group.id == security_group_id)
                .ok_or_else(|| ApiError::NotFound {
                    resource: format!("security-group/{security_group_id}"),
                })?;
            group.rules.push(ListedRule::from(rule));
            state.rules.push((security_group_id, rule.clone()));
            Ok(state.operation(Some(security_group_id)))
        })
    }

    fn list_anti_affinity_groups(&self) -> ApiFuture<'_, Vec<AntiAffinityGroup>> {
        self.respond("list_anti_affinity_groups", |state| {
            Ok(state.anti_affinity_groups.clone())
        })
    }

    fn create_anti_affinity_group<'a>(
        &'a self,
        request: &'a CreateAntiAffinityGroupRequest,
    ) -> ApiFuture<'a, Operation> {
        self.respond("create_anti_affinity_group", |state| {
            let id = Uuid::new_v4();
            state.anti_affinity_groups.push(AntiAffinityGroup {
                id,
                name: request.name.clone(),
                description: Some(request.description.clone()),
            });
            match state.anti_affinity_group_race.take() {
                Some(ConflictStyle::Http) => Err(ApiError::Conflict {
                    message: format!("anti-affinity group {} already exists", request.name),
                }),
                Some(ConflictStyle::Operation) => Ok(state.failed_operation("conflict")),
                None => Ok(state.operation(Some(id))),
            }
        })
    }

    fn register_ssh_key<'a>(
        &'a self,
        request: &'a RegisterSshKeyRequest,
    ) -> ApiFuture<'a, Operation> {
        self.respond("register_ssh_key", |state| {
            if state.ssh_keys.iter().any(|key| key.name == request.name) {
                return Err(ApiError::Conflict {
                    message: format!("SSH key {} already exists", request.name),
                });
            }
            state.ssh_keys.push(request.clone());
            Ok(state.operation(None))
        })
    }

    fn get_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, SshKey> {
        self.respond("get_ssh_key", |state| {
            state
                .ssh_keys
                .iter()
                .find(|key| key.name == name)
                .map(|key| SshKey {
                    name: key.name.clone(),
                    fingerprint: None,
                })
                .ok_or_else(|| ApiError::NotFound {
                    resource: format!("ssh-key/{name}"),
                })
        })
    }

    fn delete_ssh_key<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation> {
        self.respond("delete_ssh_key", |state| {
            let before = state.ssh_keys.len();
            state.ssh_keys.retain(|key| key.name != name);
            if state.ssh_keys.len() == before {
                return Err(ApiError::NotFound {
                    resource: format!("ssh-key/{name}"),
                });
            }
            Ok(state.operation(None))
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ApiFuture<'a, Operation> {
        self.respond("create_instance", |state| {
            let id = Uuid::new_v4();
            let password_enabled = state
                .templates
                .iter()
                .find(|template| template.id == request.template.id)
                .and_then(|template| template.password_enabled);
            state.instance_requests.push(request.clone());
            state.instances.push(Instance {
                id,
                name: request.name.clone(),
                state: InstanceState::Running,
                public_ip: state.public_ip,
                template: Some(TemplateRef {
                    id: request.template.id,
                    password_enabled,
                }),
            });
            Ok(state.operation(Some(id)))
        })
    }

    fn get_instance(&self, id: Uuid) -> ApiFuture<'_, Instance> {
        self.respond("get_instance", move |state| {
            state.instance_mut(id).cloned()
        })
    }

    fn start_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        self.respond("start_instance", move |state| {
            state.transition(id, InstanceState::Running)
        })
    }

    fn stop_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        self.respond("stop_instance", move |state| {
            state.transition(id, InstanceState::Stopped)
        })
    }

    fn reboot_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        self.respond("reboot_instance", move |state| {
            state.transition(id, InstanceState::Running)
        })
    }

    fn delete_instance(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        self.respond("delete_instance", move |state| {
            state.instance_mut(id)?;
            state.instances.retain(|instance| instance.id != id);
            Ok(state.operation(Some(id)))
        })
    }

    fn reveal_instance_password(&self, id: Uuid) -> ApiFuture<'_, String> {
        self.respond("reveal_instance_password", move |state| {
            state.instance_mut(id)?;
            Ok(state.password.clone())
        })
    }

    fn get_operation(&self, id: Uuid) -> ApiFuture<'_, Operation> {
        self.respond("get_operation", move |state| {
            state.operation_polls += 1;
            let scripted = state
                .operations
                .get_mut(&id)
                .ok_or_else(|| ApiError::NotFound {
                    resource: format!("operation/{id}"),
                })?;
            if scripted.remaining_polls > 1 {
                scripted.remaining_polls -= 1;
                return Ok(Operation {
                    id,
                    state: OperationState::Pending,
                    reason: None,
                    message: None,
                    reference: None,
                });
            }
            scripted.remaining_polls = 0;
            Ok(scripted.outcome.clone())
        })
    }
}
