//! Telegram Bot API transport
//!
//! `TelegramMessenger` implements the outbound side. [`run_polling`] is the
//! long-poll ingress; the webhook ingress lives in `api`.

pub mod types;

use crate::messenger::{ChatId, MessageRef, MessengerError, Reply, Update};
use crate::runtime::Messenger;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use types::{
    AnswerCallbackQuery, ApiResponse, EditMessageText, GetUpdates, InlineKeyboardMarkup,
    SendMessage, SentMessage, TgUpdate,
};

/// Seconds the server holds a `getUpdates` call open
const LONG_POLL_SECS: u64 = 30;
/// Client-side bound on any single request; must exceed the long poll
const REQUEST_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 15);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

pub struct TelegramMessenger {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramMessenger {
    pub fn new(api_url: &str, token: &str) -> Result<Self, MessengerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MessengerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, MessengerError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| MessengerError::Transport(e.without_url().to_string()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| MessengerError::Transport(e.without_url().to_string()))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(MessengerError::Rejected(
                description.unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>, MessengerError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: LONG_POLL_SECS,
                allowed_updates: ALLOWED_UPDATES,
            },
        )
        .await
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef, MessengerError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: chat_id.0,
                    text: &reply.text,
                    reply_markup: InlineKeyboardMarkup::from_reply(reply),
                },
            )
            .await?;
        Ok(MessageRef {
            chat_id: ChatId(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn edit_or_replace(
        &self,
        message: MessageRef,
        reply: &Reply,
    ) -> Result<MessageRef, MessengerError> {
        let edited: Result<serde_json::Value, _> = self
            .call(
                "editMessageText",
                &EditMessageText {
                    chat_id: message.chat_id.0,
                    message_id: message.message_id,
                    text: &reply.text,
                    reply_markup: InlineKeyboardMarkup::from_reply(reply),
                },
            )
            .await;

        match edited {
            Ok(_) => Ok(message),
            Err(MessengerError::Rejected(reason)) if reason.contains("message is not modified") => {
                Ok(message)
            }
            Err(MessengerError::Rejected(reason)) => {
                tracing::debug!(reason = %reason, "Edit rejected, sending a new message");
                self.send(message.chat_id, reply).await
            }
            Err(e) => Err(e),
        }
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), MessengerError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery {
                    callback_query_id: callback_id,
                },
            )
            .await?;
        Ok(())
    }
}

/// Long-poll `getUpdates` and forward every update into `sink` until
/// `cancel` fires or the sink closes
pub async fn run_polling(
    messenger: &TelegramMessenger,
    sink: mpsc::Sender<Update>,
    cancel: CancellationToken,
) {
    let mut offset = 0;
    let mut backoff = MIN_BACKOFF;
    tracing::info!("Telegram polling started");

    loop {
        let batch = tokio::select! {
            () = cancel.cancelled() => break,
            batch = messenger.get_updates(offset) => batch,
        };

        let updates = match batch {
            Ok(updates) => {
                backoff = MIN_BACKOFF;
                updates
            }
            Err(e) => {
                tracing::warn!(error = %e, retry_in = ?backoff, "Telegram poll failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for raw in updates {
            offset = offset.max(raw.update_id + 1);
            let update_id = raw.update_id;
            let Some(update) = raw.into_update() else {
                tracing::debug!(update_id, "Skipping unsupported update");
                continue;
            };
            if sink.send(update).await.is_err() {
                tracing::info!("Update sink closed, polling stopped");
                return;
            }
        }
    }

    tracing::info!("Telegram polling stopped");
}
