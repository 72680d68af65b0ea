//! Clarification-question protocol: the structured question model raised by
//! the agent, the tracker that accumulates partial answers across button
//! callbacks, and the encoder that turns a completed answer set into the
//! keystroke navigation sequence replayed against the agent's prompt.

mod encoder;
mod questions;
mod tracker;

pub use encoder::{encode_answer_actions, PromptAction, QuestionSelection};
pub use questions::{ClarificationInput, QuestionItem, QuestionOption};
pub use tracker::{
    AnswerError, AnswerProgress, PendingQuestionState, PendingQuestionTracker, ReadyAnswer,
};
