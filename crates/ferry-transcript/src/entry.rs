use serde_json::Value;

/// Tool name the agent uses to request a multiple-choice clarification.
pub const CLARIFICATION_TOOL_NAME: &str = "AskUserQuestion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Agent,
}

/// One structured block inside a transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolInvocation {
        name: String,
        invocation_id: String,
        input: Value,
    },
    ToolResult {
        invocation_id: String,
    },
}

/// One agent turn read from the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
}

impl TranscriptEntry {
    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Parses one transcript line, returning `None` for anything that is not a
/// well-formed user/agent turn. The transcript schema is owned by the
/// external agent and drifts across its releases, so malformed or unknown
/// lines are skipped rather than failing the scan.
pub fn parse_entry_line(line: &str) -> Option<TranscriptEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;

    let role = match value.get("type").and_then(Value::as_str) {
        Some("user") => Role::User,
        Some("assistant") => Role::Agent,
        _ => return None,
    };

    let content = value.get("message")?.get("content")?;
    let blocks = match content {
        Value::String(text) => vec![ContentBlock::Text { text: text.clone() }],
        Value::Array(items) => items.iter().filter_map(parse_block).collect(),
        _ => return None,
    };

    Some(TranscriptEntry { role, blocks })
}

fn parse_block(value: &Value) -> Option<ContentBlock> {
    match value.get("type").and_then(Value::as_str)? {
        "text" => Some(ContentBlock::Text {
            text: value.get("text").and_then(Value::as_str)?.to_string(),
        }),
        "tool_use" => Some(ContentBlock::ToolInvocation {
            name: value.get("name").and_then(Value::as_str)?.to_string(),
            invocation_id: value.get("id").and_then(Value::as_str)?.to_string(),
            input: value.get("input").cloned().unwrap_or(Value::Null),
        }),
        "tool_result" => Some(ContentBlock::ToolResult {
            invocation_id: value
                .get("tool_use_id")
                .and_then(Value::as_str)?
                .to_string(),
        }),
        _ => None,
    }
}
