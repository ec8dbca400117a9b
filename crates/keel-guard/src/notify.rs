//! Outbound notification channel

use crate::error::{GuardError, GuardResult};
use async_trait::async_trait;
use keel_types::{markers, NotificationIdentity, Secret};
use reqwest::Client;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sends human-readable messages to the operator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> GuardResult<()>;

    /// Get the notifier name
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API notifier
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: Secret,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(identity: &NotificationIdentity) -> GuardResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_base: "https://api.telegram.org".to_string(),
            token: identity.bot_token.clone(),
            chat_id: identity.chat_id.clone(),
        })
    }

    /// Point at a different API host.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> GuardResult<()> {
        // The token is part of the path; keep it out of any error text.
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token.expose());
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GuardError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(GuardError::Notify(format!("{}: {}", status, excerpt)));
        }
        debug!(chars = text.len(), "Notification sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Keeps every message in memory
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail.
    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> GuardResult<()> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(GuardError::Notify("recording notifier set to fail".into()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Send the "started" status and log the acknowledgment marker on delivery.
///
/// Returns whether the message was delivered. Delivery failure is logged and
/// never stops the service; the missing marker shows up in health checks.
pub async fn announce_started(notifier: &dyn Notifier, summary: &str) -> bool {
    let text = format!("🤖 <b>Bot status</b>\n\nStarted ✅\n{}", summary);
    match notifier.send(&text).await {
        Ok(()) => {
            info!(notifier = notifier.name(), "{}", markers::NOTIFY_ACK);
            true
        }
        Err(e) => {
            warn!(notifier = notifier.name(), error = %e, "Started notification not delivered");
            false
        }
    }
}
