//! # Chat transport.
//!
//! Wire types for the Telegram Bot API, the outbound [`ChatApi`] seam, the
//! HTTPS client, and the long-poll loop feeding updates into ingestion and
//! command handling.

use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use async_channel::Receiver;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::commands;
use crate::constants::{POLL_RETRY_DELAY, POLL_TIMEOUT_SECS};
use crate::context::Context;
use crate::location::{self, LocationEvent};
use crate::log::LogExt;

/// One inbound update.
///
/// Initial location shares arrive as *message*, live updates as
/// *edited_message*.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub edited_message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<TgLocation>,
    /// Some clients put the live period on the message instead of the
    /// location.
    #[serde(default)]
    pub live_period: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub live_period: Option<i64>,
}

/// The outbound transport seam.
#[async_trait]
pub trait ChatApi: Send + Sync + std::fmt::Debug {
    /// Long-polls for updates after `offset`.
    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>>;

    /// Sends an HTML-formatted text message.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Sends a text message with a single inline URL button.
    async fn send_url_button(&self, chat_id: i64, text: &str, label: &str, url: &str)
        -> Result<()>;
}

/// The real Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramApi {
    /// Creates a client for the given bot token.
    pub fn new(token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Must outlive the long-poll timeout.
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{token}"),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: serde_json::Value) -> Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("transport request {method} failed"))?
            .json()
            .await
            .with_context(|| format!("transport response of {method} unreadable"))?;

        if !response.ok {
            bail!(
                "{method} rejected: {}",
                response.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        response
            .result
            .with_context(|| format!("{method} returned no result"))
    }
}

#[async_trait]
impl ChatApi for TelegramApi {
    async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut payload = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "edited_message"],
        });
        if let Some(offset) = offset {
            payload["offset"] = offset.into();
        }
        self.call("getUpdates", payload).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call::<serde_json::Value>(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_url_button(
        &self,
        chat_id: i64,
        text: &str,
        label: &str,
        url: &str,
    ) -> Result<()> {
        self.call::<serde_json::Value>(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": {
                    "inline_keyboard": [[{"text": label, "url": url}]],
                },
            }),
        )
        .await?;
        Ok(())
    }
}

/// Long-poll loop: fetch updates, dispatch each, remember the offset.
///
/// Transport failures back off and continue; a closed interrupt channel
/// ends the loop.
pub(crate) async fn poll_loop(context: &Context, interrupt_receiver: Receiver<()>) {
    info!(context, "transport poller started");
    let mut offset: Option<i64> = None;

    loop {
        let updates = tokio::select! {
            _ = interrupt_receiver.recv() => {
                info!(context, "transport poller exits now");
                return;
            }
            res = context.chat_api.get_updates(offset, POLL_TIMEOUT_SECS) => match res {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(context, "getUpdates failed: {:#}", err);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            }
        };

        for update in updates {
            offset = Some(offset.unwrap_or(0).max(update.update_id + 1));
            dispatch_update(context, update).await;
        }
    }
}

/// Routes one update. Failures are logged, never propagated; one bad
/// update must not stall the stream.
pub(crate) async fn dispatch_update(context: &Context, update: Update) {
    let (message, is_edit) = match (update.message, update.edited_message) {
        (Some(message), _) => (message, false),
        (None, Some(message)) => (message, true),
        (None, None) => return,
    };

    if let Some(tg_location) = &message.location {
        let event = LocationEvent {
            chat_id: message.chat.id,
            message_id: message.message_id,
            latitude: tg_location.latitude,
            longitude: tg_location.longitude,
            accuracy: tg_location.horizontal_accuracy,
            heading: tg_location.heading,
            speed: tg_location.speed,
            live_period_seconds: tg_location.live_period.or(message.live_period),
            is_edit,
        };
        location::on_location_event(context, event)
            .await
            .log_err(context)
            .ok();
    } else if let Some(text) = &message.text {
        if !is_edit && text.starts_with('/') {
            commands::handle_command(context, message.chat.id, text)
                .await
                .log_err(context)
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::{Employee, LocationSource};
    use crate::test_utils::{employee_fixture, TestContext};

    #[test]
    fn test_update_deserialization() {
        // Captured (and trimmed) getUpdates payload for a live share.
        let raw = r#"{
            "update_id": 1000,
            "message": {
                "message_id": 9,
                "from": {"id": 555, "is_bot": false, "first_name": "Jane"},
                "chat": {"id": 555, "type": "private"},
                "date": 1725180000,
                "location": {
                    "latitude": -1.28,
                    "longitude": 36.81,
                    "horizontal_accuracy": 14.0,
                    "live_period": 3600
                }
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 555);
        let location = message.location.unwrap();
        assert_eq!(location.live_period, Some(3600));
        assert_eq!(location.heading, None);
    }

    #[test]
    fn test_edited_update_deserialization() {
        let raw = r#"{
            "update_id": 1001,
            "edited_message": {
                "message_id": 9,
                "chat": {"id": 555, "type": "private"},
                "date": 1725180060,
                "edit_date": 1725180060,
                "location": {"latitude": -1.29, "longitude": 36.80}
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
        assert!(update.edited_message.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_routes_location() -> anyhow::Result<()> {
        let t = TestContext::new().await;
        let sql = &t.db().sql;

        let mut employee = employee_fixture("emp-1", "uid-1");
        employee.telegram_chat_id = Some("555".to_string());
        employee.save(sql).await?;

        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 7,
                "edited_message": {
                    "message_id": 9,
                    "chat": {"id": 555, "type": "private"},
                    "location": {"latitude": -1.28, "longitude": 36.81}
                }
            }"#,
        )?;
        dispatch_update(&t.ctx, update).await;

        let stored = Employee::load(sql, "emp-1")
            .await?
            .unwrap()
            .current_location
            .unwrap();
        assert_eq!(stored.source, LocationSource::TelegramLive);
        assert!(stored.is_live);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_routes_command() -> anyhow::Result<()> {
        let t = TestContext::new().await;

        let update: Update = serde_json::from_str(
            r#"{
                "update_id": 8,
                "message": {
                    "message_id": 10,
                    "chat": {"id": 555, "type": "private"},
                    "text": "/live"
                }
            }"#,
        )?;
        dispatch_update(&t.ctx, update).await;

        let sent = t.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("live location"));
        Ok(())
    }
}
