use std::collections::HashMap;

use thiserror::Error;

use crate::encoder::QuestionSelection;
use crate::questions::QuestionItem;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("no pending question for thread '{thread_id}'")]
    NoPendingQuestion { thread_id: String },
    #[error("question index {index} is out of range")]
    UnknownQuestion { index: usize },
    #[error("option index {index} is out of range for question {question}")]
    UnknownOption { question: usize, index: usize },
    #[error("question {index} cannot be confirmed with no options selected")]
    EmptySelection { index: usize },
}

/// Outcome of one answer callback against a pending question set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerProgress {
    /// The answer set is still incomplete.
    Updated {
        remaining: usize,
        /// Labels currently selected for the touched question, in selection
        /// order.
        selected_labels: Vec<String>,
        multi_select: bool,
    },
    /// Every question is answered (and confirmed where required); the caller
    /// should collect the answer via `take_ready` and submit it.
    Ready,
}

/// A completed answer set detached from the tracker, ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyAnswer {
    pub session_id: String,
    pub invocation_id: String,
    pub selections: Vec<QuestionSelection>,
    /// One human-readable line per question: "Header: label, label".
    pub summary: Vec<String>,
}

/// Per-thread answer accumulation while a clarification is unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestionState {
    pub session_id: String,
    pub invocation_id: String,
    pub questions: Vec<QuestionItem>,
    selected_labels: Vec<Vec<String>>,
    selected_indices: Vec<Vec<usize>>,
    confirmed: Vec<bool>,
    pub created_unix_ms: u64,
}

impl PendingQuestionState {
    pub fn new(
        session_id: &str,
        invocation_id: &str,
        questions: Vec<QuestionItem>,
        now_unix_ms: u64,
    ) -> Self {
        let count = questions.len();
        Self {
            session_id: session_id.to_string(),
            invocation_id: invocation_id.to_string(),
            questions,
            selected_labels: vec![Vec::new(); count],
            selected_indices: vec![Vec::new(); count],
            confirmed: vec![false; count],
            created_unix_ms: now_unix_ms,
        }
    }

    /// Records one option click. Multi-select questions toggle membership;
    /// single-select questions replace the previous choice outright.
    pub fn record_selection(
        &mut self,
        question_index: usize,
        option_index: usize,
        label: &str,
    ) -> Result<(), AnswerError> {
        let question = self
            .questions
            .get(question_index)
            .ok_or(AnswerError::UnknownQuestion {
                index: question_index,
            })?;
        if option_index >= question.options.len() {
            return Err(AnswerError::UnknownOption {
                question: question_index,
                index: option_index,
            });
        }

        let labels = &mut self.selected_labels[question_index];
        let indices = &mut self.selected_indices[question_index];
        if question.multi_select {
            if let Some(position) = indices.iter().position(|index| *index == option_index) {
                indices.remove(position);
                if let Some(position) = labels.iter().position(|existing| existing == label) {
                    labels.remove(position);
                }
            } else {
                indices.push(option_index);
                labels.push(label.to_string());
            }
        } else {
            *indices = vec![option_index];
            *labels = vec![label.to_string()];
        }
        Ok(())
    }

    /// Marks a question's selection as final. Only meaningful for
    /// multi-select questions and only valid once something is selected.
    pub fn confirm(&mut self, question_index: usize) -> Result<(), AnswerError> {
        if question_index >= self.questions.len() {
            return Err(AnswerError::UnknownQuestion {
                index: question_index,
            });
        }
        if self.selected_indices[question_index].is_empty() {
            return Err(AnswerError::EmptySelection {
                index: question_index,
            });
        }
        self.confirmed[question_index] = true;
        Ok(())
    }

    /// True once every question has at least one selection and every
    /// multi-select question has additionally been confirmed.
    pub fn is_complete(&self) -> bool {
        self.questions.iter().enumerate().all(|(index, question)| {
            if self.selected_indices[index].is_empty() {
                return false;
            }
            !question.multi_select || self.confirmed[index]
        })
    }

    pub fn remaining(&self) -> usize {
        self.questions
            .iter()
            .enumerate()
            .filter(|(index, question)| {
                self.selected_indices[*index].is_empty()
                    || (question.multi_select && !self.confirmed[*index])
            })
            .count()
    }

    pub fn selected_labels(&self, question_index: usize) -> &[String] {
        self.selected_labels
            .get(question_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn selections(&self) -> Vec<QuestionSelection> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, question)| QuestionSelection {
                question_index: index,
                selected_indices: self.selected_indices[index].clone(),
                is_multi_select: question.multi_select,
                option_count: question.options.len(),
            })
            .collect()
    }

    fn summary(&self) -> Vec<String> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                format!(
                    "{}: {}",
                    question.header_or_default(),
                    self.selected_labels[index].join(", ")
                )
            })
            .collect()
    }
}

/// All unresolved clarifications, keyed by thread.
#[derive(Debug, Default)]
pub struct PendingQuestionTracker {
    entries: HashMap<String, PendingQuestionState>,
}

impl PendingQuestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the pending question set for a thread.
    pub fn insert(&mut self, thread_id: &str, state: PendingQuestionState) {
        self.entries.insert(thread_id.to_string(), state);
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.entries.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_selection(
        &mut self,
        thread_id: &str,
        question_index: usize,
        option_index: usize,
        label: &str,
    ) -> Result<AnswerProgress, AnswerError> {
        let state = self
            .entries
            .get_mut(thread_id)
            .ok_or_else(|| AnswerError::NoPendingQuestion {
                thread_id: thread_id.to_string(),
            })?;
        state.record_selection(question_index, option_index, label)?;
        Ok(progress_for(state, question_index))
    }

    pub fn confirm(
        &mut self,
        thread_id: &str,
        question_index: usize,
    ) -> Result<AnswerProgress, AnswerError> {
        let state = self
            .entries
            .get_mut(thread_id)
            .ok_or_else(|| AnswerError::NoPendingQuestion {
                thread_id: thread_id.to_string(),
            })?;
        state.confirm(question_index)?;
        Ok(progress_for(state, question_index))
    }

    /// Removes and returns the thread's answer once complete. Incomplete or
    /// absent state returns `None` and leaves the tracker untouched.
    pub fn take_ready(&mut self, thread_id: &str) -> Option<ReadyAnswer> {
        if !self
            .entries
            .get(thread_id)
            .map(PendingQuestionState::is_complete)
            .unwrap_or(false)
        {
            return None;
        }
        let state = self.entries.remove(thread_id)?;
        Some(ReadyAnswer {
            session_id: state.session_id.clone(),
            invocation_id: state.invocation_id.clone(),
            selections: state.selections(),
            summary: state.summary(),
        })
    }

    pub fn remove(&mut self, thread_id: &str) -> Option<PendingQuestionState> {
        self.entries.remove(thread_id)
    }

    /// Drops entries older than `max_age_ms` and returns their thread ids,
    /// sorted. Eviction is silent: the agent is never notified.
    pub fn evict_stale(&mut self, now_unix_ms: u64, max_age_ms: u64) -> Vec<String> {
        let mut evicted = self
            .entries
            .iter()
            .filter(|(_, state)| {
                ferry_core::is_stale_unix_ms(state.created_unix_ms, now_unix_ms, max_age_ms)
            })
            .map(|(thread_id, _)| thread_id.clone())
            .collect::<Vec<_>>();
        evicted.sort();
        for thread_id in &evicted {
            self.entries.remove(thread_id);
        }
        evicted
    }
}

fn progress_for(state: &PendingQuestionState, question_index: usize) -> AnswerProgress {
    if state.is_complete() {
        AnswerProgress::Ready
    } else {
        AnswerProgress::Updated {
            remaining: state.remaining(),
            selected_labels: state.selected_labels(question_index).to_vec(),
            multi_select: state
                .questions
                .get(question_index)
                .map(|question| question.multi_select)
                .unwrap_or(false),
        }
    }
}
