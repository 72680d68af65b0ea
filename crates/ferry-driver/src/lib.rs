//! macOS Terminal.app driver for the external agent.
//!
//! The agent runs interactively in real Terminal windows; this crate opens
//! them, pastes messages in through the clipboard, replays keystroke
//! sequences against clarification prompts, and probes window liveness. All
//! AppleScript is generated as plain strings and executed through
//! `osascript`.

pub mod script;
mod terminal;

pub use terminal::{TerminalDriver, TerminalDriverConfig};
