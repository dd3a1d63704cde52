//! Unit tests for configuration validation and driver configuration.

use camino::Utf8PathBuf;
use exomachine::config::{DEFAULT_IMAGE, DEFAULT_INSTANCE_TYPE, DEFAULT_ZONE};
use exomachine::{ConfigError, Credentials, DiskSize, ExoscaleConfig, SshKeySource};
use rstest::*;

#[fixture]
fn valid_config() -> ExoscaleConfig {
    ExoscaleConfig {
        api_key: String::from("EXOEXAMPLEKEY"),
        api_secret_key: String::from("EXAMPLESECRET"),
        url: None,
        instance_profile: String::from(DEFAULT_INSTANCE_TYPE),
        disk_size: 50,
        image: String::from(DEFAULT_IMAGE),
        security_groups: None,
        anti_affinity_groups: None,
        availability_zone: String::from(DEFAULT_ZONE),
        ssh_user: None,
        ssh_key: None,
        userdata: None,
    }
}

#[rstest]
fn config_validation_rejects_missing_secret_with_actionable_error(valid_config: ExoscaleConfig) {
    let cfg = ExoscaleConfig {
        api_secret_key: String::from("   "),
        ..valid_config
    };

    let error = cfg.validate().expect_err("secret is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error");
    };
    assert!(
        message.contains("EXOSCALE_API_SECRET_KEY"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("exomachine.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("api_secret_key"),
        "error should mention TOML key: {message}"
    );
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration file for each required field.
#[rstest]
#[case::api_key(|cfg: &mut ExoscaleConfig| cfg.api_key.clear(), "EXOSCALE_API_KEY", "api_key")]
#[case::image(|cfg: &mut ExoscaleConfig| cfg.image.clear(), "EXOSCALE_IMAGE", "image")]
#[case::instance_type(
    |cfg: &mut ExoscaleConfig| cfg.instance_profile.clear(),
    "EXOSCALE_INSTANCE_PROFILE",
    "instance_profile"
)]
#[case::zone(
    |cfg: &mut ExoscaleConfig| cfg.availability_zone.clear(),
    "EXOSCALE_AVAILABILITY_ZONE",
    "availability_zone"
)]
fn config_validation_produces_actionable_errors_for_all_fields(
    valid_config: ExoscaleConfig,
    #[case] mutate: fn(&mut ExoscaleConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let message = cfg
        .validate()
        .expect_err("validation should fail")
        .to_string();

    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains("exomachine.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
fn config_rejects_unsupported_disk_size(valid_config: ExoscaleConfig) {
    let cfg = ExoscaleConfig {
        disk_size: 42,
        ..valid_config
    };

    assert_eq!(cfg.validate(), Err(ConfigError::InvalidDiskSize(42)));
}

#[rstest]
fn driver_config_applies_defaults(valid_config: ExoscaleConfig) {
    let config = valid_config
        .as_driver_config("node-1", "/tmp/exomachine/node-1")
        .unwrap_or_else(|err| panic!("valid config yields driver config: {err}"));

    assert_eq!(config.machine_name, "node-1");
    assert_eq!(config.store_path, Utf8PathBuf::from("/tmp/exomachine/node-1"));
    assert_eq!(config.zone, DEFAULT_ZONE);
    assert_eq!(config.image, DEFAULT_IMAGE);
    assert_eq!(config.instance_type, DEFAULT_INSTANCE_TYPE);
    assert_eq!(config.disk_size, DiskSize::Gib50);
    assert_eq!(config.security_groups, vec![String::from("exomachine")]);
    assert!(config.anti_affinity_groups.is_empty());
    assert_eq!(config.ssh_key, SshKeySource::Generate);
    assert_eq!(config.endpoint, None);
    assert_eq!(
        config.credentials,
        Credentials::new("EXOEXAMPLEKEY", "EXAMPLESECRET")
    );
}

#[rstest]
fn driver_config_splits_group_lists(valid_config: ExoscaleConfig) {
    let cfg = ExoscaleConfig {
        security_groups: Some(String::from("web, ssh ,,")),
        anti_affinity_groups: Some(String::from("spread")),
        ..valid_config
    };

    let config = cfg
        .as_driver_config("node-1", "/tmp/node-1")
        .expect("driver config");

    assert_eq!(
        config.security_groups,
        vec![String::from("web"), String::from("ssh")]
    );
    assert_eq!(config.anti_affinity_groups, vec![String::from("spread")]);
}

#[rstest]
fn empty_security_group_setting_attaches_none(valid_config: ExoscaleConfig) {
    let cfg = ExoscaleConfig {
        security_groups: Some(String::new()),
        ..valid_config
    };

    let config = cfg
        .as_driver_config("node-1", "/tmp/node-1")
        .expect("driver config");

    assert!(config.security_groups.is_empty());
}

#[rstest]
fn driver_config_imports_configured_key(valid_config: ExoscaleConfig) {
    let cfg = ExoscaleConfig {
        ssh_key: Some(String::from(" ~/.ssh/id_ed25519 ")),
        ssh_user: Some(String::from("  ")),
        url: Some(String::from("https://api-de-fra-1.exoscale.com/v2")),
        ..valid_config
    };

    let config = cfg
        .as_driver_config("node-1", "/tmp/node-1")
        .expect("driver config");

    assert_eq!(
        config.ssh_key,
        SshKeySource::Import(Utf8PathBuf::from("~/.ssh/id_ed25519"))
    );
    assert_eq!(config.ssh_user, None);
    assert_eq!(
        config.endpoint.as_deref(),
        Some("https://api-de-fra-1.exoscale.com/v2")
    );
}

#[rstest]
fn driver_config_requires_machine_name(valid_config: ExoscaleConfig) {
    let err = valid_config
        .as_driver_config("  ", "/tmp/node-1")
        .expect_err("blank name is rejected");

    assert_eq!(err, ConfigError::MissingField(String::from("machine_name")));
}

#[rstest]
#[case(10, DiskSize::Gib10)]
#[case(50, DiskSize::Gib50)]
#[case(100, DiskSize::Gib100)]
#[case(200, DiskSize::Gib200)]
#[case(400, DiskSize::Gib400)]
fn disk_sizes_accept_platform_values(#[case] gib: u32, #[case] expected: DiskSize) {
    assert_eq!(DiskSize::try_from(gib), Ok(expected));
    assert_eq!(expected.gib(), gib);
    assert_eq!(expected.to_string(), format!("{gib} GiB"));
}

#[rstest]
#[case(0)]
#[case(20)]
#[case(1000)]
fn disk_sizes_reject_other_values(#[case] gib: u32) {
    assert_eq!(DiskSize::try_from(gib), Err(ConfigError::InvalidDiskSize(gib)));
}
