//! Telegram Bot API adapter
//!
//! Long polling for incoming commands plus message delivery with retries.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::commands::CommandHandler;
use crate::services::dispatcher::ChatOutput;
use crate::types::{ChatId, Result, RevtrackError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Seconds Telegram holds a getUpdates request open
const LONG_POLL_SECS: u64 = 30;

/// Pause after a failed getUpdates call
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Commands advertised to clients via setMyCommands
pub const BOT_COMMANDS: [(&str, &str); 8] = [
    ("today", "Today's revenue (optionally for one model)"),
    ("yesterday", "Yesterday's revenue"),
    ("week", "Last 7 days"),
    ("stats", "Today's combined revenue"),
    ("models", "List linked models"),
    ("link", "Link a model to this chat"),
    ("unlink", "Remove a linked model"),
    ("help", "Show available commands"),
];

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff capped at `max_delay_ms`
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

/// A failed API call and whether repeating it may succeed
#[derive(Debug)]
struct ApiFailure {
    error: RevtrackError,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl ApiFailure {
    fn transient(message: String) -> Self {
        Self {
            error: RevtrackError::Transport(message),
            retryable: true,
            retry_after: None,
        }
    }

    fn permanent(message: String) -> Self {
        Self {
            error: RevtrackError::Transport(message),
            retryable: false,
            retry_after: None,
        }
    }
}

/// Telegram Bot API client
pub struct TelegramClient {
    http_client: Client,
    api_base: String,
    bot_token: String,
    retry_config: RetryConfig,
}

impl TelegramClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(bot_token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        // Must outlive the long-poll hold time
        let http_client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 15))
            .build()
            .map_err(|e| RevtrackError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            retry_config: RetryConfig::default(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Send a plain-text message, retrying transient failures
    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let _: Value = self.request_with_retry("sendMessage", &payload).await?;
        Ok(())
    }

    /// Register the command list shown in Telegram clients
    pub async fn set_my_commands(&self) -> Result<()> {
        let commands: Vec<Value> = BOT_COMMANDS
            .iter()
            .map(|(command, description)| json!({"command": command, "description": description}))
            .collect();
        let _: Value = self
            .request_with_retry("setMyCommands", &json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });
        self.request("getUpdates", &payload)
            .await
            .map_err(|failure| failure.error)
    }

    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.request(method, payload).await {
                Ok(result) => return Ok(result),
                Err(failure) if failure.retryable && attempt < self.retry_config.max_retries => {
                    let delay = failure
                        .retry_after
                        .unwrap_or_else(|| self.retry_config.delay(attempt));
                    warn!(
                        method,
                        error = %failure.error,
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt + 1,
                        max_retries = self.retry_config.max_retries,
                        "Telegram request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> std::result::Result<T, ApiFailure> {
        let response = self
            .http_client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiFailure::transient(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiFailure::transient(format!("failed to read {} response: {}", method, e)))?;

        parse_response(method, status, &body)
    }
}

fn parse_response<T: DeserializeOwned>(
    method: &str,
    status: StatusCode,
    body: &str,
) -> std::result::Result<T, ApiFailure> {
    let parsed: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            let message = format!("{} returned {} with unreadable body: {}", method, status, e);
            return Err(if status.is_server_error() {
                ApiFailure::transient(message)
            } else {
                ApiFailure::permanent(message)
            });
        }
    };

    if parsed.ok {
        if let Some(result) = parsed.result {
            return Ok(result);
        }
    }

    let message = format!(
        "{} failed ({}): {}",
        method,
        status,
        parsed.description.as_deref().unwrap_or("no description")
    );
    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    Err(ApiFailure {
        error: RevtrackError::Transport(message),
        retryable,
        retry_after: parsed
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs),
    })
}

#[async_trait]
impl ChatOutput for TelegramClient {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

/// Process updates one at a time until the future is dropped
pub async fn run_polling(client: &TelegramClient, handler: &CommandHandler) {
    let mut offset: i64 = 0;
    info!("polling Telegram for updates");

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "getUpdates failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.as_deref() else {
                continue;
            };

            let chat_id = message.chat.id;
            let Some(reply) = handler.handle_text(chat_id, text).await else {
                debug!(chat_id, "ignoring non-command message");
                continue;
            };

            if let Err(e) = client.send_message(chat_id, &reply).await {
                error!(chat_id, error = %e, "failed to deliver reply");
            }
        }
    }
}
