use thiserror::Error;

/// Failures surfaced to the transport layer.
///
/// `Timeout` is deliberately distinct from the driver failures so callers
/// can post a "still working" notice instead of a generic error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no session recorded for thread '{thread_id}'")]
    SessionNotFound { thread_id: String },

    #[error("driver surface unavailable for thread '{thread_id}': {reason}")]
    DriverUnavailable { thread_id: String, reason: String },

    #[error("agent turn did not settle within {budget_ms} ms")]
    Timeout { budget_ms: u64 },

    #[error("thread '{thread_id}' already has an operation in flight")]
    Busy { thread_id: String },

    #[error("session store persistence failed: {0:#}")]
    Store(#[source] anyhow::Error),
}
