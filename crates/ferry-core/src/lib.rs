//! Low-level helpers shared across Ferry crates.
//!
//! Hosts the atomic-replace file writer used by every durable store and the
//! unix-time utilities used for session metadata and staleness sweeps.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Writes `content` through a sibling temp file and renames it into place so
/// a crash mid-write can never leave a partially written file behind.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("ferry-state"),
        std::process::id(),
        unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to rename {} into {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Returns the current unix timestamp in milliseconds.
pub fn unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns true when `created_unix_ms` lies more than `max_age_ms` behind
/// `now_unix_ms`.
pub fn is_stale_unix_ms(created_unix_ms: u64, now_unix_ms: u64, max_age_ms: u64) -> bool {
    now_unix_ms.saturating_sub(created_unix_ms) > max_age_ms
}
