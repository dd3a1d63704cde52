//! SSH credential preparation.
//!
//! A machine either gets a fresh ed25519 key pair, generated with the system
//! `ssh-keygen` and registered with the platform only until the first
//! successful connection, or reuses an existing private key whose public half
//! is injected through cloud-init. In both cases the private key ends up at
//! `<store>/ssh_key`.

use std::ffi::OsString;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Permissions, fs_utf8::Dir};
use thiserror::Error;
use tracing::{debug, info};

use crate::command::CommandRunner;
use crate::compute::{ComputeApi, RegisterSshKeyRequest};
use crate::error::DriverError;
use crate::paths::{absolutize, split_parent};
use crate::wait::OperationWaiter;

/// File name of the private key inside the store directory.
pub const KEY_FILE_NAME: &str = "ssh_key";
const PUBLIC_KEY_FILE_NAME: &str = "ssh_key.pub";
const KEY_PAIR_PREFIX: &str = "exomachine-";
const KEYGEN_PROGRAM: &str = "ssh-keygen";
#[cfg(unix)]
const PRIVATE_KEY_MODE: u32 = 0o600;

/// Errors raised while preparing SSH credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshKeyError {
    /// Raised when the store directory cannot be created or opened.
    #[error("failed to prepare store directory {path}: {message}")]
    Store {
        /// Store directory.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when `ssh-keygen` cannot be run or exits unsuccessfully.
    #[error("ssh-keygen failed: {message}")]
    Keygen {
        /// Error output or spawn failure.
        message: String,
    },
    /// Raised when a key file cannot be read.
    #[error("failed to read {path}: {message}")]
    Read {
        /// Key file path.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the public key file is empty.
    #[error("public key {path} is empty")]
    EmptyPublicKey {
        /// Public key file path.
        path: Utf8PathBuf,
    },
    /// Raised when the private key cannot be copied into the store.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the configured key path cannot be resolved.
    #[error("invalid SSH key path `{path}`: {message}")]
    InvalidPath {
        /// Configured path.
        path: String,
        /// Resolution failure.
        message: String,
    },
}

/// Returns the name under which a generated key pair is registered.
///
/// # Examples
///
/// ```
/// # use exomachine::ssh::key_pair_name;
/// assert_eq!(key_pair_name("node-1"), "exomachine-node-1");
/// ```
#[must_use]
pub fn key_pair_name(machine_name: &str) -> String {
    format!("{KEY_PAIR_PREFIX}{machine_name}")
}

/// Generates an ed25519 key pair at `<store>/ssh_key` unless one exists, and
/// returns the public key.
///
/// # Errors
///
/// Returns [`SshKeyError`] when the store cannot be prepared, `ssh-keygen`
/// fails, or the public key cannot be read.
pub fn generate_key_pair<R: CommandRunner>(
    runner: &R,
    store_path: &Utf8Path,
    comment: &str,
) -> Result<String, SshKeyError> {
    let dir = open_store(store_path)?;
    let key_path = store_path.join(KEY_FILE_NAME);
    let exists = dir
        .try_exists(KEY_FILE_NAME)
        .map_err(|err| read_error(&key_path, &err))?;

    if exists {
        debug!(path = %key_path, "reusing existing SSH key");
    } else {
        let args: Vec<OsString> = [
            "-q", "-t", "ed25519", "-N", "", "-C", comment, "-f", key_path.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        let output = runner
            .run(KEYGEN_PROGRAM, &args)
            .map_err(|err| SshKeyError::Keygen {
                message: err.to_string(),
            })?;
        if !output.is_success() {
            return Err(SshKeyError::Keygen {
                message: output.stderr.trim().to_owned(),
            });
        }
        info!(path = %key_path, "generated SSH key");
    }

    let public_path = store_path.join(PUBLIC_KEY_FILE_NAME);
    let public_key = dir
        .read_to_string(PUBLIC_KEY_FILE_NAME)
        .map_err(|err| read_error(&public_path, &err))?;
    non_empty_key(public_key, &public_path)
}

/// Reads the public half of an existing key and copies the private key to
/// `<store>/ssh_key` with owner-only permissions.
///
/// `~/` is expanded against `HOME` and relative paths are anchored at the
/// current directory.
///
/// # Errors
///
/// Returns [`SshKeyError`] when the path cannot be resolved or either key
/// file cannot be read or written.
pub fn import_key_pair(source: &Utf8Path, store_path: &Utf8Path) -> Result<String, SshKeyError> {
    let private_path = absolutize(source.as_str()).map_err(|message| SshKeyError::InvalidPath {
        path: source.to_string(),
        message,
    })?;
    let public_path = Utf8PathBuf::from(format!("{private_path}.pub"));

    let (source_dir, private_name) =
        split_parent(&private_path).map_err(|message| SshKeyError::InvalidPath {
            path: source.to_string(),
            message,
        })?;
    let (_, public_name) =
        split_parent(&public_path).map_err(|message| SshKeyError::InvalidPath {
            path: source.to_string(),
            message,
        })?;
    let source_handle = Dir::open_ambient_dir(source_dir, ambient_authority())
        .map_err(|err| read_error(&private_path, &err))?;

    let public_key = source_handle
        .read_to_string(public_name)
        .map_err(|err| read_error(&public_path, &err))?;
    let private_key = source_handle
        .read(private_name)
        .map_err(|err| read_error(&private_path, &err))?;

    let store = open_store(store_path)?;
    let destination = store_path.join(KEY_FILE_NAME);
    store
        .write(KEY_FILE_NAME, private_key)
        .map_err(|err| write_error(&destination, &err))?;
    restrict_permissions(&store, &destination)?;
    info!(source = %private_path, "imported SSH key");

    non_empty_key(public_key, &public_path)
}

/// Registers `public_key` as `name` and waits for the registration.
///
/// # Errors
///
/// Returns [`DriverError`] when the call or the operation fails.
pub async fn register_key_pair<A: ComputeApi>(
    api: &A,
    waiter: &OperationWaiter<'_, A>,
    name: &str,
    public_key: &str,
) -> Result<(), DriverError> {
    let request = RegisterSshKeyRequest {
        name: name.to_owned(),
        public_key: public_key.to_owned(),
    };
    let operation = api.register_ssh_key(&request).await?;
    waiter.wait(operation).await?;
    info!(name, "registered SSH key");
    Ok(())
}

/// Deletes the registered key pair `name` and waits for the deletion.
///
/// # Errors
///
/// Returns [`DriverError`] when the call or the operation fails.
pub async fn deregister_key_pair<A: ComputeApi>(
    api: &A,
    waiter: &OperationWaiter<'_, A>,
    name: &str,
) -> Result<(), DriverError> {
    let operation = api.delete_ssh_key(name).await?;
    waiter.wait(operation).await?;
    info!(name, "deleted SSH key");
    Ok(())
}

fn open_store(store_path: &Utf8Path) -> Result<Dir, SshKeyError> {
    let store_error = |err: io::Error| SshKeyError::Store {
        path: store_path.to_path_buf(),
        message: err.to_string(),
    };
    Dir::create_ambient_dir_all(store_path, ambient_authority()).map_err(store_error)?;
    Dir::open_ambient_dir(store_path, ambient_authority()).map_err(store_error)
}

#[cfg(unix)]
fn restrict_permissions(store: &Dir, destination: &Utf8Path) -> Result<(), SshKeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::Permissions::from_mode(PRIVATE_KEY_MODE);
    store
        .set_permissions(KEY_FILE_NAME, Permissions::from_std(mode))
        .map_err(|err| write_error(destination, &err))
}

#[cfg(not(unix))]
fn restrict_permissions(_store: &Dir, _destination: &Utf8Path) -> Result<(), SshKeyError> {
    Ok(())
}

fn non_empty_key(key: String, path: &Utf8Path) -> Result<String, SshKeyError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(SshKeyError::EmptyPublicKey {
            path: path.to_path_buf(),
        });
    }
    Ok(trimmed.to_owned())
}

fn read_error(path: &Utf8Path, err: &io::Error) -> SshKeyError {
    SshKeyError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn write_error(path: &Utf8Path, err: &io::Error) -> SshKeyError {
    SshKeyError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
