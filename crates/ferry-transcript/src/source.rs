use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::entry::{parse_entry_line, TranscriptEntry};

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcript {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to a session's transcript. A full re-read per poll is
/// acceptable; the classifier's cursor avoids repeated re-classification,
/// not repeated I/O.
pub trait TranscriptSource: Send + Sync {
    fn read_entries(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, TranscriptError>;
}

/// Reads `<root>/<session_id>.jsonl` as written by the external agent.
pub struct FileTranscriptSource {
    root: PathBuf,
}

impl FileTranscriptSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }
}

impl TranscriptSource for FileTranscriptSource {
    fn read_entries(&self, session_id: &str) -> Result<Vec<TranscriptEntry>, TranscriptError> {
        let path = self.transcript_path(session_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            // The agent creates the file on its first turn; absence means
            // the turn has not started yet, not an error.
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(TranscriptError::Unreadable { path, source }),
        };

        Ok(raw.lines().filter_map(parse_entry_line).collect())
    }
}
