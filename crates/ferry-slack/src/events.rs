//! Socket-mode envelope parsing and inbound event normalization.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SocketEnvelope {
    #[serde(default)]
    pub(crate) envelope_id: String,
    #[serde(rename = "type")]
    pub(crate) envelope_type: String,
    #[serde(default)]
    pub(crate) payload: Value,
}

pub(crate) fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

/// One channel message worth reacting to, after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageEvent {
    pub(crate) key: String,
    pub(crate) channel: String,
    pub(crate) text: String,
    pub(crate) ts: String,
    /// The thread this message belongs to; equals `ts` for thread roots.
    pub(crate) thread_ts: String,
    pub(crate) is_thread_reply: bool,
}

#[derive(Debug, Deserialize)]
struct EventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    event: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

/// Extracts a plain user message from an `events_api` envelope. Returns
/// `None` for anything the bridge must ignore: non-message events, message
/// subtypes (edits, joins), bot messages, and empty text.
pub(crate) fn normalize_message_event(envelope: &SocketEnvelope) -> Option<MessageEvent> {
    if envelope.envelope_type != "events_api" {
        return None;
    }
    let callback =
        serde_json::from_value::<EventCallbackEnvelope>(envelope.payload.clone()).ok()?;
    if callback.callback_type != "event_callback" {
        return None;
    }
    let event = callback.event;
    if event.event_type != "message" {
        return None;
    }
    if event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    let channel = event.channel.filter(|value| !value.trim().is_empty())?;
    let ts = event.ts.filter(|value| !value.trim().is_empty())?;
    let text = event.text.filter(|value| !value.trim().is_empty())?;

    let is_thread_reply = event.thread_ts.is_some();
    let thread_ts = event.thread_ts.unwrap_or_else(|| ts.clone());
    Some(MessageEvent {
        key: format!("{channel}-{ts}"),
        channel,
        text,
        ts,
        thread_ts,
        is_thread_reply,
    })
}

pub(crate) const SELECT_ACTION_PREFIX: &str = "ask_user_question_";
pub(crate) const CONFIRM_ACTION_PREFIX: &str = "ask_confirm_";

/// A button click against a rendered question message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockAction {
    Select {
        thread_ts: String,
        question_index: usize,
        option_index: usize,
        label: String,
    },
    ConfirmDone {
        thread_ts: String,
        question_index: usize,
    },
}

impl BlockAction {
    pub(crate) fn thread_ts(&self) -> &str {
        match self {
            Self::Select { thread_ts, .. } | Self::ConfirmDone { thread_ts, .. } => thread_ts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SelectActionValue {
    #[serde(rename = "threadTs")]
    thread_ts: String,
    #[serde(rename = "questionIndex")]
    question_index: usize,
    #[serde(rename = "optionIndex")]
    option_index: usize,
    label: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmActionValue {
    #[serde(rename = "threadTs")]
    thread_ts: String,
    #[serde(rename = "questionIndex")]
    question_index: usize,
}

/// Extracts a question button click from an `interactive` envelope.
pub(crate) fn parse_block_action(envelope: &SocketEnvelope) -> Option<BlockAction> {
    if envelope.envelope_type != "interactive" {
        return None;
    }
    if envelope.payload.get("type").and_then(Value::as_str) != Some("block_actions") {
        return None;
    }
    let action = envelope.payload.get("actions")?.as_array()?.first()?;
    let action_id = action.get("action_id").and_then(Value::as_str)?;
    let value = action.get("value").and_then(Value::as_str)?;

    if action_id.starts_with(SELECT_ACTION_PREFIX) {
        let parsed = serde_json::from_str::<SelectActionValue>(value).ok()?;
        Some(BlockAction::Select {
            thread_ts: parsed.thread_ts,
            question_index: parsed.question_index,
            option_index: parsed.option_index,
            label: parsed.label,
        })
    } else if action_id.starts_with(CONFIRM_ACTION_PREFIX) {
        let parsed = serde_json::from_str::<ConfirmActionValue>(value).ok()?;
        Some(BlockAction::ConfirmDone {
            thread_ts: parsed.thread_ts,
            question_index: parsed.question_index,
        })
    } else {
        None
    }
}
