//! Single-instance pid file lock.
//!
//! One bridge per machine: two instances would double-deliver keystrokes
//! into the same Terminal windows. A leftover pid file from a crashed run is
//! detected with a signal-0 probe and replaced.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use ferry_core::write_text_atomic;

#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: PathBuf) -> Result<Self> {
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let existing = raw.trim().parse::<i32>().ok();
                match existing {
                    Some(pid) if process_alive(pid) => {
                        bail!(
                            "another bridge instance is already running (pid {pid}); \
                             stop it or delete {}",
                            path.display()
                        );
                    }
                    _ => {
                        tracing::warn!(path = %path.display(), "removing stale pid file");
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("reading pid file {}", path.display()));
            }
        }

        write_text_atomic(&path, &std::process::id().to_string())
            .with_context(|| format!("writing pid file {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn release(&self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove pid file");
            }
        }
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 delivers nothing but reports whether the pid exists.
    unsafe { libc::kill(pid, 0) == 0 }
}
