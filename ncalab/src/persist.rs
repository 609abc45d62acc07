//! Persistence utilities — atomic file writes, JSON load/save.
//!
//! Experiment registries, checkpoint manifests and run logs all go through
//! the same write-to-tmp-then-rename path so a crash mid-write never leaves
//! a truncated artifact behind.

use std::path::Path;

use crate::error::NcaError;

/// Atomically write pretty-printed JSON to `path`.
///
/// Parent directories are created if missing.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), NcaError> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to `path` via a `.tmp` sibling.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), NcaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize JSON from `path`.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, NcaError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}
