//! Session/response orchestration core.
//!
//! Ties the session store, transcript classifier, answer encoder, and
//! pending-question tracker together behind three operations: start a new
//! turn, resume an existing session, and submit a completed answer set. The
//! chat transport and the terminal driver stay behind narrow traits; the
//! orchestrator only ever branches on liveness and delivery success.

mod driver;
mod error;
mod orchestrator;
#[cfg(test)]
mod tests;

pub use driver::{AgentDriver, DriverHandle, OpenedSession};
pub use error::BridgeError;
pub use orchestrator::{OrchestratorConfig, ResponseOrchestrator, TurnOutcome};
