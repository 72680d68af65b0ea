//! `ferry` binary: bridges a Slack channel to a long-running external
//! coding agent driven through macOS Terminal windows.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use ferry_driver::{TerminalDriver, TerminalDriverConfig};
use ferry_runtime::{OrchestratorConfig, ResponseOrchestrator};
use ferry_session::SessionStore;
use ferry_slack::{SlackBridge, SlackBridgeConfig};
use ferry_transcript::{project_transcript_dir, FileTranscriptSource};

mod pidlock;

use pidlock::PidLock;

#[derive(Debug, Parser)]
#[command(name = "ferry", about = "Slack to terminal-agent bridge", version)]
struct Cli {
    #[arg(
        long,
        env = "FERRY_SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack app-level token (xapp-...) for socket mode"
    )]
    app_token: String,

    #[arg(
        long,
        env = "FERRY_SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token (xoxb-...)"
    )]
    bot_token: String,

    #[arg(
        long,
        env = "FERRY_TARGET_CHANNEL",
        help = "Channel id whose messages are bridged"
    )]
    channel: String,

    #[arg(
        long,
        env = "FERRY_SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base URL"
    )]
    api_base: String,

    #[arg(
        long,
        env = "FERRY_WORKING_DIR",
        default_value = ".",
        help = "Working directory new agent sessions start in"
    )]
    working_dir: PathBuf,

    #[arg(
        long,
        env = "FERRY_STATE_DIR",
        default_value = ".ferry",
        help = "Directory for the session store and pid file"
    )]
    state_dir: PathBuf,

    #[arg(
        long,
        env = "FERRY_TRANSCRIPT_DIR",
        help = "Transcript directory override; defaults to the agent's per-project directory under ~/.claude"
    )]
    transcript_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "FERRY_AGENT_COMMAND",
        default_value = "claude",
        help = "External agent CLI executable"
    )]
    agent_command: String,

    #[arg(
        long,
        env = "FERRY_SYSTEM_PROMPT",
        default_value = "You draft Slack thread replies. Answer concisely and propose one reply.",
        help = "System prompt appended to new agent sessions"
    )]
    system_prompt: String,

    #[arg(long, env = "FERRY_TURN_TIMEOUT_MS", default_value_t = 120_000)]
    turn_timeout_ms: u64,

    #[arg(long, env = "FERRY_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    #[arg(long, env = "FERRY_QUESTION_STALE_MS", default_value_t = 300_000)]
    question_stale_ms: u64,

    #[arg(long, env = "FERRY_PROCESSED_EVENT_CAP", default_value_t = 1_000)]
    processed_event_cap: usize,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn transcript_root(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.transcript_dir {
        return Ok(dir.clone());
    }
    let home = std::env::var("HOME").context("HOME is not set; pass --transcript-dir")?;
    let agent_home = PathBuf::from(home).join(".claude");
    Ok(project_transcript_dir(&agent_home, &cli.working_dir))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("creating state dir {}", cli.state_dir.display()))?;
    let _pid_lock = PidLock::acquire(cli.state_dir.join("ferry.pid"))?;

    let sessions = SessionStore::load(cli.state_dir.join("sessions.json"));
    let transcripts = FileTranscriptSource::new(transcript_root(&cli)?);
    tracing::info!(
        transcripts = %transcripts.root().display(),
        state_dir = %cli.state_dir.display(),
        "ferry starting"
    );

    let driver = TerminalDriver::new(TerminalDriverConfig {
        agent_command: cli.agent_command.clone(),
        system_prompt: cli.system_prompt.clone(),
        working_dir: cli.working_dir.clone(),
        ..TerminalDriverConfig::default()
    });

    let orchestrator = ResponseOrchestrator::new(
        driver,
        transcripts,
        sessions,
        OrchestratorConfig {
            working_dir: cli.working_dir.clone(),
            poll_interval_ms: cli.poll_interval_ms,
            turn_timeout_ms: cli.turn_timeout_ms,
            question_stale_ms: cli.question_stale_ms,
        },
    );

    let mut bridge = SlackBridge::new(
        SlackBridgeConfig {
            api_base: cli.api_base.clone(),
            app_token: cli.app_token.clone(),
            bot_token: cli.bot_token.clone(),
            target_channel: cli.channel.clone(),
            processed_event_cap: cli.processed_event_cap,
            ..SlackBridgeConfig::default()
        },
        orchestrator,
    )?;

    bridge.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_with_required_args() {
        let cli = Cli::parse_from([
            "ferry",
            "--app-token",
            "xapp-1",
            "--bot-token",
            "xoxb-1",
            "--channel",
            "C123",
        ]);
        assert_eq!(cli.channel, "C123");
        assert_eq!(cli.agent_command, "claude");
        assert_eq!(cli.turn_timeout_ms, 120_000);
        assert_eq!(cli.poll_interval_ms, 500);
    }

    #[test]
    fn transcript_dir_override_wins() {
        let cli = Cli::parse_from([
            "ferry",
            "--app-token",
            "a",
            "--bot-token",
            "b",
            "--channel",
            "C1",
            "--transcript-dir",
            "/tmp/transcripts",
        ]);
        let root = transcript_root(&cli).expect("root");
        assert_eq!(root, PathBuf::from("/tmp/transcripts"));
    }
}
