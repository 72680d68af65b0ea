//! Block Kit rendering for clarification questions and answer progress.

use serde_json::{json, Value};

use ferry_protocol::{AnswerProgress, QuestionItem, ReadyAnswer};

use crate::events::{CONFIRM_ACTION_PREFIX, SELECT_ACTION_PREFIX};

const BUTTON_LABEL_MAX: usize = 75;

/// Renders one interactive message for the full question set. Each option is
/// a button whose value payload round-trips everything the click handler
/// needs, so the handler never has to re-fetch the question.
pub(crate) fn build_question_blocks(questions: &[QuestionItem], thread_ts: &str) -> Value {
    let sanitized = thread_ts.replace('.', "_");
    let mut blocks = Vec::new();

    for (question_index, question) in questions.iter().enumerate() {
        let multi_note = if question.multi_select {
            " (select all that apply)"
        } else {
            ""
        };
        blocks.push(json!({
            "type": "section",
            "block_id": format!("question_{question_index}_{sanitized}"),
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*{}*{}\n{}",
                    question.header_or_default(),
                    multi_note,
                    question.question,
                ),
            },
        }));

        if !question.options.is_empty() {
            let elements: Vec<Value> = question
                .options
                .iter()
                .enumerate()
                .map(|(option_index, option)| {
                    json!({
                        "type": "button",
                        "text": {
                            "type": "plain_text",
                            "text": clip(&option.label, BUTTON_LABEL_MAX),
                            "emoji": true,
                        },
                        "action_id": format!(
                            "{SELECT_ACTION_PREFIX}{sanitized}_{question_index}_{option_index}"
                        ),
                        "value": json!({
                            "threadTs": thread_ts,
                            "questionIndex": question_index,
                            "optionIndex": option_index,
                            "label": option.label,
                            "isMultiSelect": question.multi_select,
                            "optionCount": question.options.len(),
                        }).to_string(),
                    })
                })
                .collect();
            blocks.push(json!({
                "type": "actions",
                "block_id": format!("options_{question_index}_{sanitized}"),
                "elements": elements,
            }));

            if question.multi_select {
                blocks.push(json!({
                    "type": "actions",
                    "block_id": format!("confirm_{question_index}_{sanitized}"),
                    "elements": [{
                        "type": "button",
                        "text": {"type": "plain_text", "text": "Done selecting", "emoji": true},
                        "style": "primary",
                        "action_id": format!("{CONFIRM_ACTION_PREFIX}{sanitized}_{question_index}"),
                        "value": json!({
                            "threadTs": thread_ts,
                            "questionIndex": question_index,
                        }).to_string(),
                    }],
                }));
            }

            let descriptions = question
                .options
                .iter()
                .filter_map(|option| {
                    option
                        .description
                        .as_deref()
                        .map(|description| format!("*{}*: {}", option.label, description))
                })
                .collect::<Vec<_>>()
                .join("\n");
            if !descriptions.is_empty() {
                blocks.push(json!({
                    "type": "context",
                    "elements": [{"type": "mrkdwn", "text": descriptions}],
                }));
            }
        }

        if question_index + 1 < questions.len() {
            blocks.push(json!({"type": "divider"}));
        }
    }

    Value::Array(blocks)
}

/// Plain fallback text for the question message notification.
pub(crate) fn question_fallback_text(questions: &[QuestionItem]) -> String {
    match questions.len() {
        1 => format!("Question: {}", questions[0].question),
        count => format!("{count} questions need answers"),
    }
}

/// Acknowledgement text after a selection or confirmation click.
pub(crate) fn progress_text(progress: &AnswerProgress) -> String {
    match progress {
        AnswerProgress::Updated {
            remaining,
            selected_labels,
            multi_select,
        } => {
            let selected = if selected_labels.is_empty() {
                "(none)".to_string()
            } else {
                selected_labels.join(", ")
            };
            if *multi_select {
                format!(
                    "Selected: {selected}. Press \"Done selecting\" to confirm. \
                     {remaining} question(s) remaining."
                )
            } else {
                format!("Answer recorded. {remaining} question(s) remaining.")
            }
        }
        AnswerProgress::Ready => "All questions answered, submitting...".to_string(),
    }
}

/// Summary line posted right before the answer set is replayed.
pub(crate) fn answer_summary_text(answer: &ReadyAnswer) -> String {
    let mut lines = vec!["Submitting answers:".to_string()];
    for entry in &answer.summary {
        lines.push(format!("- {entry}"));
    }
    lines.join("\n")
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
