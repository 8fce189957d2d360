//! Telegram Bot API wire types
//!
//! Only the fields the bot reads or writes are modelled; serde ignores the rest.

use crate::messenger::{ChatId, MessageRef, Reply, Update, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Inbound
// ============================================================================

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgUser>,
    pub chat: TgChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgMessage>,
    pub data: Option<String>,
}

impl TgUpdate {
    /// Convert to a transport-neutral update. Anything the bot does not
    /// handle (stickers, channel posts, games) yields `None`.
    pub fn into_update(self) -> Option<Update> {
        if let Some(query) = self.callback_query {
            let payload = query.data?;
            let user_id = UserId(query.from.id);
            let message = query.message.map(|m| MessageRef {
                chat_id: ChatId(m.chat.id),
                message_id: m.message_id,
            });
            let chat_id = message.map_or(ChatId(query.from.id), |m| m.chat_id);
            return Some(Update::button(
                user_id,
                chat_id,
                payload,
                Some(query.id),
                message,
            ));
        }

        let message = self.message?;
        let from = message.from?;
        let text = message.text?;
        Some(Update::from_text(
            UserId(from.id),
            ChatId(message.chat.id),
            &text,
        ))
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GetUpdates {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct InlineKeyboardButton<'a> {
    pub text: &'a str,
    pub callback_data: &'a str,
}

#[derive(Debug, Serialize)]
pub struct InlineKeyboardMarkup<'a> {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

impl<'a> InlineKeyboardMarkup<'a> {
    /// `None` for a reply without buttons
    pub fn from_reply(reply: &'a Reply) -> Option<Self> {
        if reply.keyboard.is_empty() {
            return None;
        }
        let inline_keyboard = reply
            .keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| InlineKeyboardButton {
                        text: &button.label,
                        callback_data: &button.payload,
                    })
                    .collect()
            })
            .collect();
        Some(Self { inline_keyboard })
    }
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
pub struct EditMessageText<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
pub struct AnswerCallbackQuery<'a> {
    pub callback_query_id: &'a str,
}

/// Subset of the `Message` returned by send and edit calls
#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    pub chat: TgChat,
}
