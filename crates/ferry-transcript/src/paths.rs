use std::path::{Path, PathBuf};

/// Derives the per-project transcript directory the external agent writes
/// into: `<agent_home>/projects/<munged-working-dir>`, where the munge
/// replaces every path character outside `[A-Za-z0-9-]` with `-`.
pub fn project_transcript_dir(agent_home: &Path, working_dir: &Path) -> PathBuf {
    let munged = working_dir
        .display()
        .to_string()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect::<String>();
    agent_home.join("projects").join(munged)
}
