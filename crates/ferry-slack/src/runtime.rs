//! Socket-mode event loop wiring Slack threads to the orchestrator.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use ferry_core::unix_timestamp_ms;
use ferry_runtime::{
    AgentDriver, BridgeError, ResponseOrchestrator, TurnOutcome,
};
use ferry_transcript::TranscriptSource;

use crate::api_client::SlackApiClient;
use crate::blocks::{
    answer_summary_text, build_question_blocks, progress_text, question_fallback_text,
};
use crate::events::{
    normalize_message_event, parse_block_action, parse_socket_envelope, BlockAction, MessageEvent,
    SocketEnvelope,
};
use crate::helpers::truncate_for_slack;

const SLACK_MESSAGE_MAX_CHARS: usize = 38_000;

#[derive(Debug, Clone)]
pub struct SlackBridgeConfig {
    pub api_base: String,
    pub app_token: String,
    pub bot_token: String,
    /// Only messages in this channel are bridged.
    pub target_channel: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub processed_event_cap: usize,
    pub sweep_interval_ms: u64,
}

impl Default for SlackBridgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            app_token: String::new(),
            bot_token: String::new(),
            target_channel: String::new(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            reconnect_delay_ms: 5_000,
            processed_event_cap: 1_000,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Remembers recently handled event keys so redelivered envelopes are
/// dropped. Bounded; the oldest key falls out first.
struct ProcessedEventCache {
    seen: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl ProcessedEventCache {
    fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    /// Returns false when the key was already recorded.
    fn insert(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_string());
        self.order.push_back(key.to_string());
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

pub struct SlackBridge<D, T> {
    config: SlackBridgeConfig,
    client: SlackApiClient,
    orchestrator: Arc<ResponseOrchestrator<D, T>>,
    processed: ProcessedEventCache,
}

impl<D, T> SlackBridge<D, T>
where
    D: AgentDriver + 'static,
    T: TranscriptSource + 'static,
{
    pub fn new(
        config: SlackBridgeConfig,
        orchestrator: ResponseOrchestrator<D, T>,
    ) -> Result<Self> {
        let client = SlackApiClient::new(
            config.api_base.clone(),
            config.app_token.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;
        let processed = ProcessedEventCache::new(config.processed_event_cap);
        Ok(Self {
            config,
            client,
            orchestrator: Arc::new(orchestrator),
            processed,
        })
    }

    /// Runs until ctrl-c. Socket drops reconnect after a fixed delay.
    pub async fn run(&mut self) -> Result<()> {
        let bot_user_id = self.client.resolve_bot_user_id().await?;
        tracing::info!(%bot_user_id, channel = %self.config.target_channel, "slack bridge starting");

        loop {
            let socket_url = match self.client.open_socket_connection().await {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!(%error, "failed to open slack socket connection");
                    if wait_or_shutdown(self.config.reconnect_delay_ms).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            tracing::info!("slack socket connected");
            if let Err(error) = self.run_socket_session(&socket_url).await {
                tracing::warn!(%error, "slack socket session ended with error");
            }
            if wait_or_shutdown(self.config.reconnect_delay_ms).await {
                return Ok(());
            }
        }
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<()> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();
        let mut sweep = tokio::time::interval(Duration::from_millis(
            self.config.sweep_interval_ms.max(1),
        ));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                _ = sweep.tick() => {
                    self.orchestrator.evict_stale_questions(unix_timestamp_ms());
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(());
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    if let Some(envelope) = parse_socket_envelope(message)? {
                        if !envelope.envelope_id.is_empty() {
                            let ack = json!({ "envelope_id": envelope.envelope_id }).to_string();
                            sink.send(WsMessage::Text(ack.into()))
                                .await
                                .context("failed to send slack socket ack")?;
                        }
                        self.dispatch_envelope(envelope);
                    }
                }
            }
        }
    }

    fn dispatch_envelope(&mut self, envelope: SocketEnvelope) {
        if let Some(event) = normalize_message_event(&envelope) {
            if event.channel != self.config.target_channel {
                return;
            }
            if !self.processed.insert(&event.key) {
                tracing::debug!(key = %event.key, "skipping duplicate event");
                return;
            }
            let orchestrator = Arc::clone(&self.orchestrator);
            let client = self.client.clone();
            tokio::spawn(async move {
                handle_message(orchestrator, client, event).await;
            });
            return;
        }

        if let Some(action) = parse_block_action(&envelope) {
            let orchestrator = Arc::clone(&self.orchestrator);
            let client = self.client.clone();
            let channel = self.config.target_channel.clone();
            tokio::spawn(async move {
                handle_action(orchestrator, client, channel, action).await;
            });
        }
    }
}

/// Waits out the reconnect delay; returns true when ctrl-c arrived instead.
async fn wait_or_shutdown(delay_ms: u64) -> bool {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            true
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => false,
    }
}

async fn handle_message<D, T>(
    orchestrator: Arc<ResponseOrchestrator<D, T>>,
    client: SlackApiClient,
    event: MessageEvent,
) where
    D: AgentDriver,
    T: TranscriptSource,
{
    let thread_ts = event.thread_ts.clone();
    let outcome = if event.is_thread_reply && orchestrator.has_session(&thread_ts) {
        orchestrator.execute_resume(&thread_ts, &event.text).await
    } else {
        orchestrator.execute_new(&thread_ts, &event.text).await
    };
    post_outcome(&client, &event.channel, &thread_ts, outcome).await;
}

async fn handle_action<D, T>(
    orchestrator: Arc<ResponseOrchestrator<D, T>>,
    client: SlackApiClient,
    channel: String,
    action: BlockAction,
) where
    D: AgentDriver,
    T: TranscriptSource,
{
    let thread_ts = action.thread_ts().to_string();
    let progress = match &action {
        BlockAction::Select {
            question_index,
            option_index,
            label,
            ..
        } => orchestrator.record_selection(&thread_ts, *question_index, *option_index, label),
        BlockAction::ConfirmDone { question_index, .. } => {
            orchestrator.confirm_question(&thread_ts, *question_index)
        }
    };

    let progress = match progress {
        Ok(progress) => progress,
        // Stale clicks after eviction or double submission land here.
        Err(error) => {
            tracing::debug!(%thread_ts, %error, "ignoring question click");
            return;
        }
    };

    post_text(&client, &channel, &thread_ts, &progress_text(&progress)).await;

    if let Some(answer) = orchestrator.take_ready_answer(&thread_ts) {
        post_text(&client, &channel, &thread_ts, &answer_summary_text(&answer)).await;
        let outcome = orchestrator.submit_answer(&thread_ts, &answer.selections).await;
        post_outcome(&client, &channel, &thread_ts, outcome).await;
    }
}

async fn post_outcome(
    client: &SlackApiClient,
    channel: &str,
    thread_ts: &str,
    outcome: Result<TurnOutcome, BridgeError>,
) {
    match outcome {
        Ok(TurnOutcome::Final { text }) => {
            post_text(client, channel, thread_ts, &text).await;
        }
        Ok(TurnOutcome::Question { questions }) => {
            let blocks = build_question_blocks(&questions, thread_ts);
            let fallback = question_fallback_text(&questions);
            if let Err(error) = client
                .post_message(channel, &fallback, Some(thread_ts), Some(blocks))
                .await
            {
                tracing::warn!(%thread_ts, %error, "failed to post question blocks");
            }
        }
        Err(BridgeError::Busy { .. }) => {
            tracing::debug!(%thread_ts, "dropping message for busy thread");
        }
        Err(BridgeError::Timeout { budget_ms }) => {
            let notice = format!(
                "The agent is still working after {}s; check back in this thread later.",
                budget_ms / 1_000
            );
            post_text(client, channel, thread_ts, &notice).await;
        }
        // Run failures stay out of the channel; the log carries them.
        Err(error) => {
            tracing::error!(%thread_ts, %error, "bridge operation failed");
        }
    }
}

async fn post_text(client: &SlackApiClient, channel: &str, thread_ts: &str, text: &str) {
    let text = truncate_for_slack(text, SLACK_MESSAGE_MAX_CHARS);
    if let Err(error) = client.post_message(channel, &text, Some(thread_ts), None).await {
        tracing::warn!(%thread_ts, %error, "failed to post slack message");
    }
}
