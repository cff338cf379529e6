//! Typed JSON persistence with optimistic concurrency
//!
//! All profile state (plugins config, plugins lock, cache sidecars) goes
//! through this module. Writes are atomic (temp file + rename) and may be
//! guarded by a compare-and-swap: the caller states what it believes the
//! file currently contains, and the write fails with [`Error::Stale`] when
//! another process got there first.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read a JSON file into `T`. Returns `None` when the file does not exist.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Read the current raw value of a JSON file, for use as the
/// `expected_prior` of a later [`write`].
pub fn current_value(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Read a JSON file, writing and returning `default()` when it is absent.
pub fn read_or_init<T, F>(path: &Path, default: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    match read(path)? {
        Some(value) => Ok(value),
        None => {
            let value = default();
            write(path, &value, None)?;
            Ok(value)
        }
    }
}

/// Write `value` to `path` atomically, but only if the file currently
/// holds `expected_prior` (with `None` meaning "the file must not exist").
/// Fails with [`Error::Stale`] otherwise.
pub fn write<T: Serialize>(path: &Path, value: &T, expected_prior: Option<&Value>) -> Result<()> {
    let current = current_value(path)?;
    if current.as_ref() != expected_prior {
        return Err(Error::Stale {
            path: path.to_path_buf(),
        });
    }
    save(path, value)
}

/// Write `value` to `path` atomically, unconditionally.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        Error::Io(std::io::Error::other(format!(
            "no parent directory for {}",
            path.display()
        )))
    })?;
    fs::create_dir_all(parent)?;

    let content = serde_json::to_string_pretty(value)?;
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    fs::write(tmp.path(), content.as_bytes())?;
    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}
