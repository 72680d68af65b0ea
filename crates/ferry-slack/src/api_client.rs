//! Slack Web API client used by the bridge for auth, socket setup, and
//! posting.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

#[derive(Debug, Clone, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub(crate) struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub(crate) fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("ferry-slack-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    pub(crate) async fn resolve_bot_user_id(&self) -> Result<String> {
        let response: SlackAuthTestResponse = self
            .request_json("auth.test", || {
                self.http
                    .post(format!("{}/auth.test", self.api_base))
                    .bearer_auth(&self.bot_token)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack auth.test failed: {}",
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))
    }

    pub(crate) async fn open_socket_connection(&self) -> Result<String> {
        let response: SlackOpenSocketResponse = self
            .request_json("apps.connections.open", || {
                self.http
                    .post(format!("{}/apps.connections.open", self.api_base))
                    .bearer_auth(&self.app_token)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack apps.connections.open failed: {}",
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    /// Posts a threaded message; `blocks` carries Block Kit content when the
    /// message is an interactive question.
    pub(crate) async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<Value>,
    ) -> Result<String> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }
        if let Some(blocks) = blocks {
            payload["blocks"] = blocks;
        }

        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(format!("{}/chat.postMessage", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "slack chat.postMessage failed: {}",
                response
                    .error
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        response
            .ts
            .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(base: String) -> SlackApiClient {
        SlackApiClient::new(
            base,
            "xapp-test".to_string(),
            "xoxb-test".to_string(),
            2_000,
            3,
            1,
        )
        .expect("build client")
    }

    #[tokio::test]
    async fn auth_test_returns_bot_user_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth.test")
                    .header("authorization", "Bearer xoxb-test");
                then.status(200)
                    .json_body(json!({"ok": true, "user_id": "U123"}));
            })
            .await;

        let user_id = client(server.base_url())
            .resolve_bot_user_id()
            .await
            .expect("bot user id");
        assert_eq!(user_id, "U123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn socket_open_uses_app_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/apps.connections.open")
                    .header("authorization", "Bearer xapp-test");
                then.status(200)
                    .json_body(json!({"ok": true, "url": "wss://example.test/socket"}));
            })
            .await;

        let url = client(server.base_url())
            .open_socket_connection()
            .await
            .expect("socket url");
        assert_eq!(url, "wss://example.test/socket");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_message_threads_and_carries_blocks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat.postMessage")
                    .json_body_includes(
                        json!({
                            "channel": "C1",
                            "text": "question",
                            "thread_ts": "111.222",
                            "blocks": [{"type": "divider"}],
                        })
                        .to_string(),
                    );
                then.status(200).json_body(json!({"ok": true, "ts": "333.444"}));
            })
            .await;

        let ts = client(server.base_url())
            .post_message(
                "C1",
                "question",
                Some("111.222"),
                Some(json!([{"type": "divider"}])),
            )
            .await
            .expect("post");
        assert_eq!(ts, "333.444");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_message_retries_on_server_error() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(500).body("gateway sad");
            })
            .await;

        let error = client(server.base_url())
            .post_message("C1", "hi", None, None)
            .await
            .expect_err("exhausted retries");
        assert!(error.to_string().contains("status 500"));
        assert_eq!(failing.calls_async().await, 3);
    }

    #[tokio::test]
    async fn api_level_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200)
                    .json_body(json!({"ok": false, "error": "channel_not_found"}));
            })
            .await;

        let error = client(server.base_url())
            .post_message("C-missing", "hi", None, None)
            .await
            .expect_err("api error");
        assert!(error.to_string().contains("channel_not_found"));
        assert_eq!(mock.calls_async().await, 1);
    }
}
