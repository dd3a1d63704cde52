//! Cloud-init user-data handling.
//!
//! User-data is either read from the configured file or falls back to a
//! minimal cloud-config. Imported SSH keys are appended as an
//! `ssh_authorized_keys` block, and the final payload is base64 encoded
//! before it is sent to the platform.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::paths::{expand_tilde, read_to_string_ambient};

/// Payload used when no user-data file is configured.
pub const DEFAULT_CLOUD_CONFIG: &str = "#cloud-config\nmanage_etc_hosts: localhost\n";

/// Errors raised while loading user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when a file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when the file resolves to empty or only whitespace.
    #[error("user-data file `{path}` must not be empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading the file fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Loads user-data from `path`, or returns [`DEFAULT_CLOUD_CONFIG`] when no
/// path is configured.
///
/// # Errors
///
/// Returns [`UserDataError`] when the path is blank, or the file is
/// unreadable or empty.
pub fn load_user_data(configured: Option<&Utf8Path>) -> Result<String, UserDataError> {
    let Some(path) = configured else {
        return Ok(DEFAULT_CLOUD_CONFIG.to_owned());
    };

    if path.as_str().trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = Utf8PathBuf::from(expand_tilde(path.as_str()));
    let content =
        read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
            path: expanded.to_string(),
            message,
        })?;

    if content.trim().is_empty() {
        return Err(UserDataError::FileEmpty {
            path: expanded.to_string(),
        });
    }
    Ok(content)
}

/// Appends an `ssh_authorized_keys` entry for `public_key` to `user_data`.
///
/// # Examples
///
/// ```
/// # use exomachine::user_data::append_authorized_key;
/// let mut payload = String::from("#cloud-config");
/// append_authorized_key(&mut payload, "ssh-ed25519 AAAA user@host\n");
/// assert_eq!(
///     payload,
///     "#cloud-config\nssh_authorized_keys:\n- ssh-ed25519 AAAA user@host\n"
/// );
/// ```
pub fn append_authorized_key(user_data: &mut String, public_key: &str) {
    user_data.push_str("\nssh_authorized_keys:\n- ");
    user_data.push_str(public_key.trim());
    user_data.push('\n');
}

/// Base64-encodes a user-data payload for transport.
#[must_use]
pub fn encode(user_data: &str) -> String {
    STANDARD.encode(user_data.as_bytes())
}
