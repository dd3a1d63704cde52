//! Configuration loading via `ortho-config`.
//!
//! [`ExoscaleConfig`] holds the layered user settings. A driver never reads
//! it directly: [`ExoscaleConfig::as_driver_config`] validates the settings
//! and freezes them, together with the machine identity supplied by the
//! host, into an immutable [`DriverConfig`].

use std::ffi::OsString;
use std::fmt;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::compute::Credentials;

/// Application name used for configuration discovery.
pub const APP_NAME: &str = "exomachine";
/// Default instance type, as a `family.size` key.
pub const DEFAULT_INSTANCE_TYPE: &str = "standard.small";
/// Default template name.
pub const DEFAULT_IMAGE: &str = "Linux Ubuntu 24.04 LTS 64-bit";
/// Default availability zone.
pub const DEFAULT_ZONE: &str = "ch-dk-2";
/// Security group attached when none is configured.
pub const DEFAULT_SECURITY_GROUP: &str = "exomachine";

/// Exoscale settings derived from configuration files, environment variables,
/// and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "EXOSCALE",
    discovery(
        app_name = "exomachine",
        env_var = "EXOMACHINE_CONFIG_PATH",
        config_file_name = "exomachine.toml",
        dotfile_name = ".exomachine.toml",
        project_file_name = "exomachine.toml"
    )
)]
pub struct ExoscaleConfig {
    /// API key used to sign requests.
    pub api_key: String,
    /// API secret used to sign requests.
    pub api_secret_key: String,
    /// Override for the global API endpoint.
    pub url: Option<String>,
    /// Instance type as `family.size`, a bare size, or an id.
    #[ortho_config(default = DEFAULT_INSTANCE_TYPE.to_owned())]
    pub instance_profile: String,
    /// Root disk size in GiB.
    #[ortho_config(default = 50)]
    pub disk_size: u32,
    /// Template name or short name such as `ubuntu-24.04`.
    #[ortho_config(default = DEFAULT_IMAGE.to_owned())]
    pub image: String,
    /// Comma-separated security group names. Unset means the `exomachine`
    /// group; an empty string attaches none.
    pub security_groups: Option<String>,
    /// Comma-separated anti-affinity group names.
    pub anti_affinity_groups: Option<String>,
    /// Availability zone.
    #[ortho_config(default = DEFAULT_ZONE.to_owned())]
    pub availability_zone: String,
    /// SSH username override.
    pub ssh_user: Option<String>,
    /// Path to an existing private key to import instead of generating one.
    pub ssh_key: Option<String>,
    /// Path to a cloud-init user-data file.
    pub userdata: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ExoscaleConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {APP_NAME}.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidDiskSize`] for unsupported disk sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_key,
            &FieldMetadata::new("Exoscale API key", "EXOSCALE_API_KEY", "api_key"),
        )?;
        Self::require_field(
            &self.api_secret_key,
            &FieldMetadata::new(
                "Exoscale API secret key",
                "EXOSCALE_API_SECRET_KEY",
                "api_secret_key",
            ),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("template name", "EXOSCALE_IMAGE", "image"),
        )?;
        Self::require_field(
            &self.instance_profile,
            &FieldMetadata::new(
                "instance type",
                "EXOSCALE_INSTANCE_PROFILE",
                "instance_profile",
            ),
        )?;
        Self::require_field(
            &self.availability_zone,
            &FieldMetadata::new(
                "availability zone",
                "EXOSCALE_AVAILABILITY_ZONE",
                "availability_zone",
            ),
        )?;
        DiskSize::try_from(self.disk_size)?;
        Ok(())
    }

    /// Validates the settings and builds the immutable [`DriverConfig`] for
    /// one machine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_driver_config(
        &self,
        machine_name: &str,
        store_path: impl Into<Utf8PathBuf>,
    ) -> Result<DriverConfig, ConfigError> {
        self.validate()?;
        let security_groups = self
            .security_groups
            .as_deref()
            .map_or_else(|| vec![DEFAULT_SECURITY_GROUP.to_owned()], split_names);
        let anti_affinity_groups = self
            .anti_affinity_groups
            .as_deref()
            .map(split_names)
            .unwrap_or_default();
        let ssh_key = self
            .ssh_key
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map_or(SshKeySource::Generate, |path| {
                SshKeySource::Import(Utf8PathBuf::from(path))
            });

        DriverConfig::builder(machine_name, store_path)
            .zone(&self.availability_zone)
            .credentials(Credentials::new(
                self.api_key.trim(),
                self.api_secret_key.trim(),
            ))
            .endpoint(self.url.clone())
            .image(&self.image)
            .instance_type(&self.instance_profile)
            .disk_size(DiskSize::try_from(self.disk_size)?)
            .security_groups(security_groups)
            .anti_affinity_groups(anti_affinity_groups)
            .ssh_key(ssh_key)
            .ssh_user(self.ssh_user.clone())
            .user_data_path(self.userdata.as_deref().map(Utf8PathBuf::from))
            .build()
    }
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Root disk sizes accepted by the platform, in GiB.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DiskSize {
    /// 10 GiB.
    Gib10,
    /// 50 GiB.
    #[default]
    Gib50,
    /// 100 GiB.
    Gib100,
    /// 200 GiB.
    Gib200,
    /// 400 GiB.
    Gib400,
}

impl DiskSize {
    /// Returns the size in GiB.
    #[must_use]
    pub const fn gib(self) -> u32 {
        match self {
            Self::Gib10 => 10,
            Self::Gib50 => 50,
            Self::Gib100 => 100,
            Self::Gib200 => 200,
            Self::Gib400 => 400,
        }
    }
}

impl TryFrom<u32> for DiskSize {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::Gib10),
            50 => Ok(Self::Gib50),
            100 => Ok(Self::Gib100),
            200 => Ok(Self::Gib200),
            400 => Ok(Self::Gib400),
            other => Err(ConfigError::InvalidDiskSize(other)),
        }
    }
}

impl fmt::Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} GiB", self.gib())
    }
}

/// Where the machine's SSH key pair comes from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum SshKeySource {
    /// Generate a fresh key pair and register it with the platform until the
    /// first successful connection.
    #[default]
    Generate,
    /// Use an existing private key; `<path>.pub` must hold its public half.
    Import(Utf8PathBuf),
}

/// Immutable settings for one machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverConfig {
    /// Machine name, also used as the instance name.
    pub machine_name: String,
    /// Private storage directory of the machine.
    pub store_path: Utf8PathBuf,
    /// Availability zone name.
    pub zone: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Global API endpoint override.
    pub endpoint: Option<String>,
    /// Template name or short name.
    pub image: String,
    /// Instance type key.
    pub instance_type: String,
    /// Root disk size.
    pub disk_size: DiskSize,
    /// Security group names, in attachment order.
    pub security_groups: Vec<String>,
    /// Anti-affinity group names, in attachment order.
    pub anti_affinity_groups: Vec<String>,
    /// SSH key source.
    pub ssh_key: SshKeySource,
    /// SSH username override.
    pub ssh_user: Option<String>,
    /// Path to a cloud-init user-data file.
    pub user_data_path: Option<Utf8PathBuf>,
}

impl DriverConfig {
    /// Starts a builder for the given machine, pre-filled with defaults.
    #[must_use]
    pub fn builder(
        machine_name: impl Into<String>,
        store_path: impl Into<Utf8PathBuf>,
    ) -> DriverConfigBuilder {
        DriverConfigBuilder::new(machine_name, store_path)
    }
}

/// Builder for [`DriverConfig`] that trims inputs and validates on build.
#[derive(Clone, Debug)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config: DriverConfig {
                machine_name: machine_name.into(),
                store_path: store_path.into(),
                zone: DEFAULT_ZONE.to_owned(),
                credentials: Credentials::new("", ""),
                endpoint: None,
                image: DEFAULT_IMAGE.to_owned(),
                instance_type: DEFAULT_INSTANCE_TYPE.to_owned(),
                disk_size: DiskSize::default(),
                security_groups: Vec::new(),
                anti_affinity_groups: Vec::new(),
                ssh_key: SshKeySource::Generate,
                ssh_user: None,
                user_data_path: None,
            },
        }
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.config.zone = value.into();
        self
    }

    /// Sets the API credentials.
    #[must_use]
    pub fn credentials(mut self, value: Credentials) -> Self {
        self.config.credentials = value;
        self
    }

    /// Sets the global endpoint override.
    #[must_use]
    pub fn endpoint(mut self, value: Option<String>) -> Self {
        self.config.endpoint = value;
        self
    }

    /// Sets the template name.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.config.image = value.into();
        self
    }

    /// Sets the instance type key.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.config.instance_type = value.into();
        self
    }

    /// Sets the root disk size.
    #[must_use]
    pub const fn disk_size(mut self, value: DiskSize) -> Self {
        self.config.disk_size = value;
        self
    }

    /// Sets the security group names.
    #[must_use]
    pub fn security_groups(mut self, value: Vec<String>) -> Self {
        self.config.security_groups = value;
        self
    }

    /// Sets the anti-affinity group names.
    #[must_use]
    pub fn anti_affinity_groups(mut self, value: Vec<String>) -> Self {
        self.config.anti_affinity_groups = value;
        self
    }

    /// Sets the SSH key source.
    #[must_use]
    pub fn ssh_key(mut self, value: SshKeySource) -> Self {
        self.config.ssh_key = value;
        self
    }

    /// Sets the SSH username override.
    #[must_use]
    pub fn ssh_user(mut self, value: Option<String>) -> Self {
        self.config.ssh_user = value;
        self
    }

    /// Sets the user-data file path.
    #[must_use]
    pub fn user_data_path(mut self, value: Option<Utf8PathBuf>) -> Self {
        self.config.user_data_path = value;
        self
    }

    /// Builds the [`DriverConfig`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the machine name, store
    /// path, zone, image, or instance type is empty.
    pub fn build(self) -> Result<DriverConfig, ConfigError> {
        let mut config = self.config;
        config.machine_name = config.machine_name.trim().to_owned();
        config.zone = config.zone.trim().to_owned();
        config.image = config.image.trim().to_owned();
        config.instance_type = config.instance_type.trim().to_owned();
        config.endpoint = config
            .endpoint
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        config.ssh_user = config
            .ssh_user
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        for (value, field) in [
            (config.machine_name.as_str(), "machine_name"),
            (config.store_path.as_str(), "store_path"),
            (config.zone.as_str(), "zone"),
            (config.image.as_str(), "image"),
            (config.instance_type.as_str(), "instance_type"),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingField(field.to_owned()));
            }
        }
        Ok(config)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised for disk sizes the platform does not offer.
    #[error("unsupported disk size {0} GiB: choose 10, 50, 100, 200 or 400")]
    InvalidDiskSize(u32),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
