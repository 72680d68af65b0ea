use serde::{Deserialize, Serialize};

/// One selectable option inside a clarification question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One clarification question raised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, rename = "multiSelect")]
    pub multi_select: bool,
}

impl QuestionItem {
    /// Display label for the question, falling back when no header was set.
    pub fn header_or_default(&self) -> &str {
        self.header.as_deref().unwrap_or("Question")
    }
}

/// Structured input carried by the agent's clarification tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationInput {
    #[serde(default)]
    pub questions: Vec<QuestionItem>,
}
