use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use ferry_protocol::PromptAction;

/// Opaque reference to one interactive surface (a terminal window). The
/// orchestrator persists and round-trips it; only the driver interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverHandle(pub String);

#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub handle: DriverHandle,
    pub session_id: String,
}

/// Delivery capability against the external agent's interactive surface.
///
/// Every method is best-effort RPC with no semantics beyond "delivered";
/// turn completion is observed through the transcript, never through the
/// driver.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    /// Opens a fresh surface, starts a new agent session in `working_dir`,
    /// and delivers `initial_message` as its first turn.
    async fn open_session(&self, working_dir: &Path, initial_message: &str)
        -> Result<OpenedSession>;

    /// Opens a fresh surface resuming an existing agent session.
    async fn resume_session(&self, session_id: &str) -> Result<DriverHandle>;

    async fn is_alive(&self, handle: &DriverHandle) -> bool;

    async fn deliver_text(&self, handle: &DriverHandle, text: &str) -> Result<()>;

    /// Replays a pre-encoded navigation sequence against the surface's
    /// clarification prompt. Executed blindly; the driver gets no feedback.
    async fn deliver_actions(&self, handle: &DriverHandle, actions: &[PromptAction]) -> Result<()>;

    /// Removes any scratch artifacts accumulated for the surface.
    async fn cleanup_surface(&self, handle: &DriverHandle) -> Result<()>;
}

#[async_trait]
impl<D: AgentDriver + ?Sized> AgentDriver for std::sync::Arc<D> {
    async fn open_session(
        &self,
        working_dir: &Path,
        initial_message: &str,
    ) -> Result<OpenedSession> {
        (**self).open_session(working_dir, initial_message).await
    }

    async fn resume_session(&self, session_id: &str) -> Result<DriverHandle> {
        (**self).resume_session(session_id).await
    }

    async fn is_alive(&self, handle: &DriverHandle) -> bool {
        (**self).is_alive(handle).await
    }

    async fn deliver_text(&self, handle: &DriverHandle, text: &str) -> Result<()> {
        (**self).deliver_text(handle, text).await
    }

    async fn deliver_actions(&self, handle: &DriverHandle, actions: &[PromptAction]) -> Result<()> {
        (**self).deliver_actions(handle, actions).await
    }

    async fn cleanup_surface(&self, handle: &DriverHandle) -> Result<()> {
        (**self).cleanup_surface(handle).await
    }
}
