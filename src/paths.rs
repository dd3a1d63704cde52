//! Path helpers shared by user-data loading and SSH key import.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Expands a leading `~/` to the current user's home directory.
///
/// Only the `~/` prefix is expanded; other tilde forms are returned unchanged.
///
/// # Examples
///
/// ```
/// # use exomachine::paths::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_ed25519"), format!("{home}/.ssh/id_ed25519"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Expands `~/` and anchors relative paths at the current directory.
///
/// # Errors
///
/// Returns a message when the current directory is unavailable or not UTF-8.
pub fn absolutize(path: &str) -> Result<Utf8PathBuf, String> {
    let expanded = Utf8PathBuf::from(expand_tilde(path));
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    let current = std::env::current_dir().map_err(|err| err.to_string())?;
    let cwd = Utf8PathBuf::from_path_buf(current)
        .map_err(|raw| format!("current directory is not UTF-8: {}", raw.display()))?;
    Ok(cwd.join(expanded))
}

/// Reads a file through a capability handle on its parent directory.
pub(crate) fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = split_parent(path)?;
    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

/// Splits a path into the directory to open and the entry inside it.
pub(crate) fn split_parent(path: &Utf8Path) -> Result<(&Utf8Path, &Utf8Path), String> {
    if path.is_absolute() {
        let parent = path
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path}"))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path}"))?;
        Ok((parent, Utf8Path::new(file_name)))
    } else {
        Ok((Utf8Path::new("."), path))
    }
}
