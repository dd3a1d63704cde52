//! JSON persistence of [`RuntimeState`] inside a machine's store directory.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::state::RuntimeState;

const STATE_FILE_NAME: &str = "machine.json";

/// Errors raised while reading or writing persisted state.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the state file holds invalid JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Reads and writes `machine.json` under a store directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateStore {
    store_path: Utf8PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `store_path`.
    #[must_use]
    pub fn new(store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }

    /// Returns the full path of the state file.
    #[must_use]
    pub fn file_path(&self) -> Utf8PathBuf {
        self.store_path.join(STATE_FILE_NAME)
    }

    /// Loads the persisted state, returning an empty state when the store or
    /// file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the file cannot be read or parsed.
    pub fn load(&self) -> Result<RuntimeState, StateStoreError> {
        let dir = match Dir::open_ambient_dir(&self.store_path, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RuntimeState::default());
            }
            Err(err) => return Err(io_error(&self.store_path, &err)),
        };

        let contents = match dir.read_to_string(STATE_FILE_NAME) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RuntimeState::default());
            }
            Err(err) => return Err(io_error(&self.file_path(), &err)),
        };

        if contents.trim().is_empty() {
            return Ok(RuntimeState::default());
        }

        serde_json::from_str(&contents).map_err(|err| StateStoreError::Parse {
            path: self.file_path(),
            message: err.to_string(),
        })
    }

    /// Writes `state`, creating the store directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::Io`] when the directory or file cannot be
    /// written.
    pub fn save(&self, state: &RuntimeState) -> Result<(), StateStoreError> {
        Dir::create_ambient_dir_all(&self.store_path, ambient_authority())
            .map_err(|err| io_error(&self.store_path, &err))?;
        let dir = Dir::open_ambient_dir(&self.store_path, ambient_authority())
            .map_err(|err| io_error(&self.store_path, &err))?;

        let mut rendered =
            serde_json::to_string_pretty(state).map_err(|err| StateStoreError::Io {
                path: self.file_path(),
                message: err.to_string(),
            })?;
        rendered.push('\n');

        dir.write(STATE_FILE_NAME, rendered)
            .map_err(|err| io_error(&self.file_path(), &err))
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> StateStoreError {
    StateStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
