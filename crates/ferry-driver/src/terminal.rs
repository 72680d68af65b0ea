use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use ferry_protocol::PromptAction;
use ferry_runtime::{AgentDriver, DriverHandle, OpenedSession};

use crate::script;

#[derive(Debug, Clone)]
pub struct TerminalDriverConfig {
    /// Executable name or path of the external agent CLI.
    pub agent_command: String,
    /// System prompt appended when opening a brand-new session.
    pub system_prompt: String,
    /// Working directory used when a surface is resumed; new sessions take
    /// theirs from the caller.
    pub working_dir: PathBuf,
    /// Per-surface script files live under here until cleanup.
    pub scratch_dir: PathBuf,
    /// Wait after opening a window before the first paste, so the agent CLI
    /// has its prompt up.
    pub launch_settle_ms: u64,
    pub script_timeout_ms: u64,
}

impl Default for TerminalDriverConfig {
    fn default() -> Self {
        Self {
            agent_command: "claude".to_string(),
            system_prompt: String::new(),
            working_dir: PathBuf::from("."),
            scratch_dir: std::env::temp_dir().join("ferry-scripts"),
            launch_settle_ms: 2_000,
            script_timeout_ms: 15_000,
        }
    }
}

/// Drives the external agent through macOS Terminal.app windows.
///
/// Each opened window gets a scratch directory holding every script executed
/// against it; `cleanup_surface` deletes the directory. The handle encodes
/// both the scratch tag and the Terminal window id.
pub struct TerminalDriver {
    config: TerminalDriverConfig,
    script_counter: AtomicU64,
}

impl TerminalDriver {
    pub fn new(config: TerminalDriverConfig) -> Self {
        Self {
            config,
            script_counter: AtomicU64::new(0),
        }
    }

    async fn open_surface(&self, shell_command: &str) -> Result<(String, String)> {
        let tag = Uuid::new_v4().simple().to_string();
        let surface_dir = self.config.scratch_dir.join(&tag);
        tokio::fs::create_dir_all(&surface_dir)
            .await
            .with_context(|| format!("creating scratch dir {}", surface_dir.display()))?;

        let path = self
            .write_script(&surface_dir, "open", &script::open_window_script(shell_command))
            .await?;
        let window_id = self.run_script_file(&path).await?;
        if window_id.is_empty() || !window_id.chars().all(|c| c.is_ascii_digit()) {
            bail!("Terminal did not report a window id (got '{window_id}')");
        }
        tracing::debug!(%tag, %window_id, "opened terminal surface");
        Ok((tag, window_id))
    }

    async fn write_script(&self, surface_dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
        let sequence = self.script_counter.fetch_add(1, Ordering::Relaxed);
        let path = surface_dir.join(format!("{sequence:04}-{name}.scpt"));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing script {}", path.display()))?;
        Ok(path)
    }

    async fn run_script_file(&self, path: &Path) -> Result<String> {
        let mut command = Command::new("osascript");
        command.arg(path);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        let child = command
            .spawn()
            .with_context(|| format!("spawning osascript for {}", path.display()))?;

        let output = tokio::time::timeout(
            Duration::from_millis(self.config.script_timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "osascript timed out after {}ms running {}",
                self.config.script_timeout_ms,
                path.display()
            )
        })?
        .with_context(|| format!("waiting for osascript on {}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "osascript failed with status {} on {}: {}",
                output
                    .status
                    .code()
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                path.display(),
                truncate_for_log(stderr.trim()),
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_against_surface(
        &self,
        handle: &DriverHandle,
        name: &str,
        body: &str,
    ) -> Result<String> {
        let surface = parse_handle(handle)?;
        let surface_dir = self.config.scratch_dir.join(surface.tag);
        tokio::fs::create_dir_all(&surface_dir)
            .await
            .with_context(|| format!("creating scratch dir {}", surface_dir.display()))?;
        let path = self.write_script(&surface_dir, name, body).await?;
        self.run_script_file(&path).await
    }
}

#[async_trait]
impl AgentDriver for TerminalDriver {
    async fn open_session(
        &self,
        working_dir: &Path,
        initial_message: &str,
    ) -> Result<OpenedSession> {
        let session_id = Uuid::new_v4().to_string();
        let launch = script::launch_command(
            &self.config.agent_command,
            &working_dir.display().to_string(),
            &session_id,
            &self.config.system_prompt,
        );
        let (tag, window_id) = self.open_surface(&launch).await?;
        let handle = DriverHandle(format_handle(&tag, &window_id));

        tokio::time::sleep(Duration::from_millis(self.config.launch_settle_ms)).await;
        self.deliver_text(&handle, initial_message).await?;

        Ok(OpenedSession { handle, session_id })
    }

    async fn resume_session(&self, session_id: &str) -> Result<DriverHandle> {
        let resume = script::resume_command(
            &self.config.agent_command,
            &self.config.working_dir.display().to_string(),
            session_id,
        );
        let (tag, window_id) = self.open_surface(&resume).await?;
        tokio::time::sleep(Duration::from_millis(self.config.launch_settle_ms)).await;
        Ok(DriverHandle(format_handle(&tag, &window_id)))
    }

    async fn is_alive(&self, handle: &DriverHandle) -> bool {
        let Ok(surface) = parse_handle(handle) else {
            return false;
        };
        match self
            .run_against_surface(handle, "probe", &script::probe_window_script(surface.window_id))
            .await
        {
            Ok(stdout) => stdout == "true",
            Err(error) => {
                tracing::debug!(handle = %handle.0, %error, "window probe failed");
                false
            }
        }
    }

    async fn deliver_text(&self, handle: &DriverHandle, text: &str) -> Result<()> {
        let surface = parse_handle(handle)?;
        self.run_against_surface(
            handle,
            "paste",
            &script::paste_message_script(surface.window_id, text),
        )
        .await?;
        Ok(())
    }

    async fn deliver_actions(&self, handle: &DriverHandle, actions: &[PromptAction]) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let surface = parse_handle(handle)?;
        self.run_against_surface(
            handle,
            "answer",
            &script::replay_actions_script(surface.window_id, actions),
        )
        .await?;
        Ok(())
    }

    async fn cleanup_surface(&self, handle: &DriverHandle) -> Result<()> {
        let surface = parse_handle(handle)?;
        let surface_dir = self.config.scratch_dir.join(surface.tag);
        match tokio::fs::remove_dir_all(&surface_dir).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error)
                .with_context(|| format!("removing scratch dir {}", surface_dir.display())),
        }
    }
}

struct Surface<'a> {
    tag: &'a str,
    window_id: &'a str,
}

fn format_handle(tag: &str, window_id: &str) -> String {
    format!("{tag}:{window_id}")
}

fn parse_handle(handle: &DriverHandle) -> Result<Surface<'_>> {
    let (tag, window_id) = handle
        .0
        .split_once(':')
        .with_context(|| format!("malformed driver handle '{}'", handle.0))?;
    if tag.is_empty() || window_id.is_empty() {
        bail!("malformed driver handle '{}'", handle.0);
    }
    Ok(Surface { tag, window_id })
}

fn truncate_for_log(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_CHARS).collect::<String>() + "..."
}
