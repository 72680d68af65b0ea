use serde::{Deserialize, Serialize};

/// One low-level navigation action replayed blindly by the driver.
///
/// The agent prompt's navigation is assumed strictly linear and
/// single-directional: the cursor only moves forward, indices are
/// zero-based, and toggling never advances the cursor. The driver executes
/// without feedback, so a violated assumption silently selects the wrong
/// options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptAction {
    MoveForward,
    Toggle,
    Confirm,
}

/// The completed answer for one question, ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSelection {
    pub question_index: usize,
    /// Selected option indices. Order of selection is irrelevant to the
    /// encoder, which always walks them ascending.
    pub selected_indices: Vec<usize>,
    pub is_multi_select: bool,
    /// Total option count, used to compute the terminal submit position for
    /// multi-select questions.
    pub option_count: usize,
}

/// Encodes a full answer set into the ordered action sequence for the
/// agent's clarification prompt. Pure and deterministic.
pub fn encode_answer_actions(selections: &[QuestionSelection]) -> Vec<PromptAction> {
    let mut ordered = selections.to_vec();
    ordered.sort_by_key(|selection| selection.question_index);

    let mut actions = Vec::new();
    for selection in &ordered {
        if selection.is_multi_select {
            encode_multi_select(selection, &mut actions);
        } else {
            encode_single_select(selection, &mut actions);
        }
    }

    // The prompt ends on a final submission screen that takes one confirm.
    actions.push(PromptAction::Confirm);
    actions
}

fn encode_single_select(selection: &QuestionSelection, actions: &mut Vec<PromptAction>) {
    let target = selection
        .selected_indices
        .first()
        .copied()
        .unwrap_or(0)
        .min(selection.option_count);
    for _ in 0..target {
        actions.push(PromptAction::MoveForward);
    }
    actions.push(PromptAction::Confirm);
}

fn encode_multi_select(selection: &QuestionSelection, actions: &mut Vec<PromptAction>) {
    let mut targets = selection.selected_indices.clone();
    targets.sort_unstable();
    targets.dedup();

    let mut cursor = 0usize;
    for target in targets {
        for _ in 0..target.saturating_sub(cursor) {
            actions.push(PromptAction::MoveForward);
        }
        actions.push(PromptAction::Toggle);
        cursor = target;
    }

    // Walk past the free-text slot to the submit control at optionCount + 1.
    let terminal = selection.option_count + 1;
    for _ in 0..terminal.saturating_sub(cursor) {
        actions.push(PromptAction::MoveForward);
    }
    actions.push(PromptAction::Confirm);
}
