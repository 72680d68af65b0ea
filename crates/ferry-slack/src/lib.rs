//! Slack socket-mode transport for the bridge.
//!
//! Connects over socket mode, filters channel messages down to the target
//! channel, routes thread replies into existing agent sessions, renders
//! clarification questions as Block Kit buttons, and feeds button clicks
//! back through the orchestrator.

mod api_client;
mod blocks;
mod events;
mod helpers;
mod runtime;

pub use runtime::{SlackBridge, SlackBridgeConfig};
