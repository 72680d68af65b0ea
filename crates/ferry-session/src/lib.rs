//! Durable mapping from chat thread identity to agent session identity.
//!
//! The store is rewritten wholesale on every mutation using atomic replace so
//! a crash mid-write cannot corrupt it. Loading tolerates a missing or
//! corrupt file by starting empty; losing the map only costs session
//! continuity, never process startup.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ferry_core::write_text_atomic;

const SESSION_STORE_SCHEMA_VERSION: u32 = 1;

/// One record per chat thread with an active or historical agent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The external agent's session identifier. Immutable once created.
    pub session_id: String,
    /// Driver surface reference (a Terminal window id). May be replaced when
    /// the original surface is lost.
    #[serde(default)]
    pub driver_handle: Option<String>,
    pub created_unix_ms: u64,
    pub last_used_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionStoreFile {
    schema_version: u32,
    #[serde(default)]
    sessions: BTreeMap<String, SessionRecord>,
}

impl Default for SessionStoreFile {
    fn default() -> Self {
        Self {
            schema_version: SESSION_STORE_SCHEMA_VERSION,
            sessions: BTreeMap::new(),
        }
    }
}

pub struct SessionStore {
    path: PathBuf,
    state: SessionStoreFile,
}

impl SessionStore {
    /// Loads the store from `path`. A missing, unreadable, or structurally
    /// invalid file yields an empty store and a warning rather than an error.
    pub fn load(path: PathBuf) -> Self {
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SessionStoreFile>(&raw) {
                Ok(parsed) if parsed.schema_version == SESSION_STORE_SCHEMA_VERSION => parsed,
                Ok(parsed) => {
                    tracing::warn!(
                        path = %path.display(),
                        found = parsed.schema_version,
                        expected = SESSION_STORE_SCHEMA_VERSION,
                        "session store schema mismatch, starting empty"
                    );
                    SessionStoreFile::default()
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "session store unparsable, starting empty"
                    );
                    SessionStoreFile::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                SessionStoreFile::default()
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "session store unreadable, starting empty"
                );
                SessionStoreFile::default()
            }
        };

        Self { path, state }
    }

    pub fn get(&self, thread_id: &str) -> Option<&SessionRecord> {
        self.state.sessions.get(thread_id)
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.state.sessions.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.state.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.sessions.is_empty()
    }

    /// Inserts or replaces the record for `thread_id` and persists.
    pub fn put(&mut self, thread_id: &str, record: SessionRecord) -> Result<()> {
        self.state.sessions.insert(thread_id.to_string(), record);
        self.save()
    }

    /// Bumps `last_used_unix_ms` for an existing record and persists. A
    /// missing record is a no-op.
    pub fn touch(&mut self, thread_id: &str, now_unix_ms: u64) -> Result<()> {
        let Some(record) = self.state.sessions.get_mut(thread_id) else {
            return Ok(());
        };
        record.last_used_unix_ms = now_unix_ms;
        self.save()
    }

    /// Replaces the driver handle for an existing record and persists.
    pub fn replace_driver_handle(
        &mut self,
        thread_id: &str,
        driver_handle: &str,
        now_unix_ms: u64,
    ) -> Result<()> {
        let Some(record) = self.state.sessions.get_mut(thread_id) else {
            return Ok(());
        };
        record.driver_handle = Some(driver_handle.to_string());
        record.last_used_unix_ms = now_unix_ms;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.state).context("failed to serialize sessions")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write session store {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session_id: &str) -> SessionRecord {
        SessionRecord {
            session_id: session_id.to_string(),
            driver_handle: Some("window-7".to_string()),
            created_unix_ms: 1_000,
            last_used_unix_ms: 1_000,
        }
    }

    #[test]
    fn put_then_reload_round_trips_records() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sessions.json");

        let mut store = SessionStore::load(path.clone());
        store.put("1699.42", record("sess-a")).expect("put a");
        store.put("1699.43", record("sess-b")).expect("put b");

        let reloaded = SessionStore::load(path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("1699.42"), Some(&record("sess-a")));
        assert_eq!(reloaded.get("1699.43"), Some(&record("sess-b")));
    }

    #[test]
    fn missing_file_starts_empty() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::load(tempdir.path().join("absent.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_starts_empty_instead_of_failing() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sessions.json");
        std::fs::write(&path, "{not json").expect("seed corrupt file");

        let store = SessionStore::load(path);
        assert!(store.is_empty());
    }

    #[test]
    fn schema_mismatch_starts_empty() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sessions.json");
        std::fs::write(&path, "{\"schema_version\":99,\"sessions\":{}}").expect("seed");

        let store = SessionStore::load(path);
        assert!(store.is_empty());
    }

    #[test]
    fn touch_persists_last_used() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sessions.json");

        let mut store = SessionStore::load(path.clone());
        store.put("t1", record("sess-a")).expect("put");
        store.touch("t1", 9_999).expect("touch");
        store.touch("unknown", 9_999).expect("touch missing is no-op");

        let reloaded = SessionStore::load(path);
        assert_eq!(reloaded.get("t1").expect("record").last_used_unix_ms, 9_999);
    }

    #[test]
    fn replace_driver_handle_keeps_session_id() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sessions.json");

        let mut store = SessionStore::load(path.clone());
        store.put("t1", record("sess-a")).expect("put");
        store
            .replace_driver_handle("t1", "window-12", 2_000)
            .expect("replace handle");

        let reloaded = SessionStore::load(path);
        let got = reloaded.get("t1").expect("record");
        assert_eq!(got.session_id, "sess-a");
        assert_eq!(got.driver_handle.as_deref(), Some("window-12"));
        assert_eq!(got.last_used_unix_ms, 2_000);
    }
}
