//! Read-only access to the external agent's append-only transcript.
//!
//! The agent persists one JSONL line per turn; Ferry only ever reads the
//! file. Classification inspects structured content blocks to distinguish
//! "final answer", "mid-tool-use", and "blocked on a clarification" — a
//! plain did-anything-new-print signal cannot, because intermediate tool
//! activity also appends entries.

mod classifier;
mod entry;
mod paths;
mod source;

pub use classifier::{classify_entries, TranscriptCursor, TurnStatus};
pub use entry::{parse_entry_line, ContentBlock, Role, TranscriptEntry, CLARIFICATION_TOOL_NAME};
pub use paths::project_transcript_dir;
pub use source::{FileTranscriptSource, TranscriptError, TranscriptSource};
