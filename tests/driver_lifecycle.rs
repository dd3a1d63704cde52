//! End-to-end lifecycle tests against the in-memory compute platform.

use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8PathBuf;
use exomachine::compute::{ApiError, IdRef, NameRef, ResourceKind};
use exomachine::test_support::{FakeCompute, ScriptedRunner};
use exomachine::{
    ComputeApi, Driver, DriverConfig, DriverError, MachineState, RuntimeState, SshKeySource,
    StateStore,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIimported me@host";

struct Workspace {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn store(&self) -> Utf8PathBuf {
        self.root.join("store")
    }

    fn imported_key(&self) -> Utf8PathBuf {
        let key = self.root.join("id_ed25519");
        std::fs::write(&key, "PRIVATE KEY").expect("write private key");
        std::fs::write(self.root.join("id_ed25519.pub"), format!("{PUBLIC_KEY}\n"))
            .expect("write public key");
        key
    }
}

#[fixture]
fn workspace() -> Workspace {
    let temp = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp path is not UTF-8: {}", path.display()));
    Workspace { _temp: temp, root }
}

#[fixture]
fn api() -> FakeCompute {
    FakeCompute::new()
}

fn import_config(workspace: &Workspace) -> DriverConfig {
    DriverConfig::builder("node-1", workspace.store())
        .image("ubuntu-24.04")
        .instance_type("small")
        .ssh_key(SshKeySource::Import(workspace.imported_key()))
        .build()
        .expect("valid config")
}

fn driver(config: DriverConfig, api: &FakeCompute) -> Driver<FakeCompute> {
    Driver::new(config, api.clone()).with_poll_interval(Duration::ZERO)
}

fn decoded_user_data(api: &FakeCompute) -> String {
    let requests = api.instance_requests();
    let request = requests.first().expect("instance requested");
    let bytes = STANDARD
        .decode(&request.user_data)
        .expect("user data is base64");
    String::from_utf8(bytes).expect("user data is UTF-8")
}

#[rstest]
#[tokio::test]
async fn create_with_imported_key_injects_it_through_cloud_init(
    workspace: Workspace,
    api: FakeCompute,
) {
    let mut subject = driver(import_config(&workspace), &api);

    subject.create().await.expect("create succeeds");

    let templates = api.list_templates().await.expect("templates");
    let ubuntu_sizes: Vec<Option<u64>> = templates
        .iter()
        .filter(|template| template.name == "Linux Ubuntu 24.04 LTS 64-bit")
        .map(|template| template.size)
        .collect();
    assert_eq!(ubuntu_sizes, [Some(20 << 30), Some(10 << 30)]);
    let ubuntu = templates
        .iter()
        .find(|template| {
            template.name == "Linux Ubuntu 24.04 LTS 64-bit" && template.size == Some(10 << 30)
        })
        .expect("seeded 10 GiB ubuntu template");
    let requests = api.instance_requests();
    let request = requests.first().expect("instance requested");
    assert_eq!(request.template, IdRef { id: ubuntu.id });
    assert_eq!(request.disk_size, 50);
    assert!(request.ipv6_enabled);
    assert!(request.ssh_keys.is_empty());
    assert!(request.security_groups.is_empty());
    assert!(request.anti_affinity_groups.is_empty());
    assert_eq!(
        decoded_user_data(&api),
        format!("#cloud-config\nmanage_etc_hosts: localhost\n\nssh_authorized_keys:\n- {PUBLIC_KEY}\n")
    );

    let instances = api.instances();
    let instance = instances.first().expect("instance created");
    let state = subject.state();
    assert_eq!(state.instance_id, Some(instance.id));
    assert_eq!(state.ip_address, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
    assert_eq!(state.ssh_user.as_deref(), Some("ubuntu"));
    assert_eq!(state.key_pair, None);
    assert_eq!(state.password, None);
    assert_eq!(api.call_count("register_ssh_key"), 0);
    let copied =
        std::fs::read_to_string(workspace.store().join("ssh_key")).expect("private key copied");
    assert_eq!(copied, "PRIVATE KEY");
}

#[rstest]
#[tokio::test]
async fn create_with_generated_key_deregisters_it_once_ssh_answers(
    workspace: Workspace,
    api: FakeCompute,
) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind SSH stand-in");
    let port = listener.local_addr().expect("local addr").port();
    api.set_public_ip(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    let store = workspace.store();
    std::fs::create_dir_all(&store).expect("create store");
    std::fs::write(store.join("ssh_key.pub"), "ssh-ed25519 AAAAgenerated exomachine-node-1\n")
        .expect("seed generated public key");
    let runner = ScriptedRunner::new();
    runner.push_success();
    let config = DriverConfig::builder("node-1", store)
        .security_groups(vec![String::from("exomachine")])
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api)
        .with_runner(runner.clone())
        .with_ssh_port(port)
        .with_ssh_wait_timeout(Duration::from_secs(10));

    subject.create().await.expect("create succeeds");

    let requests = api.instance_requests();
    let request = requests.first().expect("instance requested");
    assert_eq!(
        request.ssh_keys,
        vec![NameRef {
            name: String::from("exomachine-node-1")
        }]
    );
    let groups = api.security_groups();
    let group = groups.first().expect("default group created");
    assert_eq!(request.security_groups, vec![IdRef { id: group.id }]);
    assert_eq!(api.rules().len(), 27);
    assert!(!decoded_user_data(&api).contains("ssh_authorized_keys"));
    assert_eq!(runner.invocations().len(), 1);
    assert_eq!(api.call_count("delete_ssh_key"), 1);
    assert!(api.ssh_key_names().is_empty());
    assert_eq!(subject.state().key_pair, None);
    drop(listener);
}

#[rstest]
#[tokio::test]
async fn create_fails_when_ssh_never_answers(workspace: Workspace, api: FakeCompute) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    api.set_public_ip(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    let store = workspace.store();
    std::fs::create_dir_all(&store).expect("create store");
    std::fs::write(store.join("ssh_key"), "PRIVATE").expect("seed private key");
    std::fs::write(store.join("ssh_key.pub"), "ssh-ed25519 AAAAexisting\n")
        .expect("seed public key");
    let config = DriverConfig::builder("node-1", store)
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api)
        .with_runner(ScriptedRunner::new())
        .with_ssh_port(port)
        .with_ssh_wait_timeout(Duration::ZERO);

    let err = subject.create().await.expect_err("SSH wait times out");

    assert!(matches!(err, DriverError::SshUnreachable { .. }), "unexpected: {err}");
    assert_eq!(
        subject.state().key_pair.as_deref(),
        Some("exomachine-node-1")
    );
    assert!(subject.state().instance_id.is_some());
}

#[rstest]
#[tokio::test]
async fn create_reveals_password_for_password_templates(workspace: Workspace, api: FakeCompute) {
    let config = DriverConfig::builder("node-1", workspace.store())
        .image("Linux CentOS Stream 9 64-bit")
        .ssh_key(SshKeySource::Import(workspace.imported_key()))
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api);

    subject.create().await.expect("create succeeds");

    assert_eq!(subject.state().password.as_deref(), Some("s3cr3t-pa55"));
    assert_eq!(subject.state().ssh_user, None);
    assert_eq!(subject.ssh_username(), "centos");
}

#[rstest]
#[tokio::test]
async fn create_waits_for_pending_operations(workspace: Workspace, api: FakeCompute) {
    api.set_pending_polls(2);
    let mut subject = driver(import_config(&workspace), &api);

    subject.create().await.expect("create succeeds");

    assert_eq!(api.operation_polls(), 2);
    assert!(subject.state().instance_id.is_some());
}

#[rstest]
#[tokio::test]
async fn create_rejects_unknown_zone_before_any_mutation(workspace: Workspace, api: FakeCompute) {
    let config = DriverConfig::builder("node-1", workspace.store())
        .zone("xx-nowhere-1")
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api);

    let err = subject.create().await.expect_err("unknown zone");

    assert_eq!(
        err,
        DriverError::UnknownZone {
            zone: String::from("xx-nowhere-1")
        }
    );
    assert_eq!(api.calls(), vec![String::from("list_zones")]);
}

#[rstest]
#[tokio::test]
async fn create_reports_missing_template(workspace: Workspace, api: FakeCompute) {
    let config = DriverConfig::builder("node-1", workspace.store())
        .image("plan9")
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api);

    let err = subject.create().await.expect_err("template missing");

    assert_eq!(
        err,
        DriverError::ResourceNotFound {
            kind: ResourceKind::Template,
            name: String::from("plan9")
        }
    );
    assert_eq!(err.to_string(), "unable to find template `plan9`");
}

#[rstest]
#[tokio::test]
async fn failed_instance_creation_leaves_groups_in_place(workspace: Workspace, api: FakeCompute) {
    api.fail_next(
        "create_instance",
        ApiError::Http {
            endpoint: String::from("POST /instance"),
            status: 500,
            message: String::from("boom"),
        },
    );
    let config = DriverConfig::builder("node-1", workspace.store())
        .security_groups(vec![String::from("exomachine")])
        .anti_affinity_groups(vec![String::from("spread")])
        .ssh_key(SshKeySource::Import(workspace.imported_key()))
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api);

    let err = subject.create().await.expect_err("instance creation fails");

    assert!(matches!(err, DriverError::Api(ApiError::Http { status: 500, .. })));
    assert_eq!(api.security_groups().len(), 1);
    assert_eq!(api.anti_affinity_groups().len(), 1);
    assert!(api.instances().is_empty());
    assert_eq!(subject.state().instance_id, None);
}

#[rstest]
#[tokio::test]
async fn full_lifecycle_round_trips_through_the_state_store(
    workspace: Workspace,
    api: FakeCompute,
) {
    let config = import_config(&workspace);
    let store = StateStore::new(workspace.store());
    let mut creator = driver(config.clone(), &api);
    creator.create().await.expect("create succeeds");
    store.save(creator.state()).expect("save state");

    let mut subject = driver(config, &api).with_state(store.load().expect("load state"));
    assert_eq!(subject.ssh_hostname().as_deref(), Ok("10.1.2.3"));
    assert_eq!(subject.url().await.as_deref(), Ok("tcp://10.1.2.3:2376"));

    subject.stop().await.expect("stop succeeds");
    assert_eq!(subject.machine_state().await, Ok(MachineState::Stopped));
    assert_eq!(
        subject.url().await,
        Err(DriverError::NotRunning {
            state: MachineState::Stopped
        })
    );
    subject.start().await.expect("start succeeds");
    subject.restart().await.expect("restart succeeds");
    assert_eq!(subject.machine_state().await, Ok(MachineState::Running));

    subject.remove().await.expect("remove succeeds");
    assert!(api.instances().is_empty());
    assert_eq!(subject.state().instance_id, None);
    store.save(subject.state()).expect("save state");
    let reloaded: RuntimeState = store.load().expect("reload state");
    assert!(reloaded.is_empty());
}

#[rstest]
#[tokio::test]
async fn remove_without_state_makes_no_calls(workspace: Workspace, api: FakeCompute) {
    let config = DriverConfig::builder("node-1", workspace.store())
        .build()
        .expect("valid config");
    let mut subject = driver(config, &api);

    subject.remove().await.expect("no-op remove");

    assert!(api.calls().is_empty());
}
