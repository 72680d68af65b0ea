use std::collections::HashSet;

use ferry_protocol::{ClarificationInput, QuestionItem};

use crate::entry::{ContentBlock, Role, TranscriptEntry, CLARIFICATION_TOOL_NAME};

/// Scan position for one in-flight turn.
///
/// `baseline` is the entry count at the moment the user turn was delivered;
/// only entries past it are considered, so a final answer left over from the
/// previous turn can never be re-reported. `examined` short-circuits rescans
/// when the transcript has not grown. Both are optimizations over a full
/// re-read per poll, never correctness-critical for a grown transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptCursor {
    pub baseline: usize,
    pub examined: usize,
}

impl TranscriptCursor {
    pub fn at_baseline(baseline: usize) -> Self {
        Self {
            baseline,
            examined: baseline,
        }
    }
}

/// Classification of the agent's latest turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnStatus {
    /// The agent is still working (or nothing new has appeared).
    Pending,
    /// The agent raised a clarification and is waiting on the user.
    BlockedOnQuestion {
        invocation_id: String,
        questions: Vec<QuestionItem>,
    },
    /// The agent finished its turn with a plain-text answer.
    Final { text: String },
}

/// Classifies the newest agent turn among `entries`.
///
/// Scans the region past `cursor.baseline` from the newest entry backward;
/// the first agent entry found decides the outcome. Tool invocations count
/// as resolved when a matching result appears in the same entry or any newer
/// one — which also covers a clarification the user answered out-of-band on
/// the terminal itself.
pub fn classify_entries(
    entries: &[TranscriptEntry],
    cursor: TranscriptCursor,
) -> (TranscriptCursor, TurnStatus) {
    if entries.len() == cursor.examined {
        return (cursor, TurnStatus::Pending);
    }

    let advanced = TranscriptCursor {
        baseline: cursor.baseline,
        examined: entries.len(),
    };
    let region_start = cursor.baseline.min(entries.len());
    let region = &entries[region_start..];

    let mut resolved: HashSet<&str> = HashSet::new();
    for entry in region.iter().rev() {
        for block in &entry.blocks {
            if let ContentBlock::ToolResult { invocation_id } = block {
                resolved.insert(invocation_id.as_str());
            }
        }

        if entry.role != Role::Agent {
            continue;
        }

        return (advanced, classify_agent_entry(entry, &resolved));
    }

    (advanced, TurnStatus::Pending)
}

fn classify_agent_entry(entry: &TranscriptEntry, resolved: &HashSet<&str>) -> TurnStatus {
    let mut unresolved_other = false;
    let mut resolved_clarification = false;
    for block in &entry.blocks {
        let ContentBlock::ToolInvocation {
            name,
            invocation_id,
            input,
        } = block
        else {
            continue;
        };
        if resolved.contains(invocation_id.as_str()) {
            // A clarification the user already answered on the terminal
            // itself must not be re-asked, and this entry carries no final
            // text either: the turn is simply still in progress.
            if name == CLARIFICATION_TOOL_NAME {
                resolved_clarification = true;
            }
            continue;
        }
        if name == CLARIFICATION_TOOL_NAME {
            match serde_json::from_value::<ClarificationInput>(input.clone()) {
                Ok(parsed) if !parsed.questions.is_empty() => {
                    return TurnStatus::BlockedOnQuestion {
                        invocation_id: invocation_id.clone(),
                        questions: parsed.questions,
                    };
                }
                Ok(_) => {
                    tracing::warn!(%invocation_id, "clarification invocation with no questions");
                    unresolved_other = true;
                }
                Err(error) => {
                    tracing::warn!(%invocation_id, %error, "unparsable clarification input");
                    unresolved_other = true;
                }
            }
        } else {
            unresolved_other = true;
        }
    }

    if unresolved_other || resolved_clarification {
        return TurnStatus::Pending;
    }

    let text = entry.text_blocks().collect::<Vec<_>>().join("\n");
    TurnStatus::Final { text }
}
