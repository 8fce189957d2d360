//! Transport-neutral message types
//!
//! Inbound events arrive as [`Update`]s; outbound content is a [`Reply`].
//! The transport (see `telegram`) converts to and from its wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identity of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat the user is talking to us from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a message we sent, used to edit the menu in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Inline button: a label and the payload sent back when pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound message content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    /// Button rows, top to bottom
    #[serde(default)]
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.keyboard.push(row);
        }
        self
    }

    /// All payloads on the keyboard, in display order
    #[allow(dead_code)] // Used by tests
    pub fn payloads(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flatten()
            .map(|b| b.payload.as_str())
            .collect()
    }
}

/// What the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// `/name args...`
    Command { name: String, args: Vec<String> },
    /// Inline button press
    Button {
        payload: String,
        /// Transport id to acknowledge the press
        callback_id: Option<String>,
        /// Message carrying the pressed button
        message: Option<MessageRef>,
    },
    /// Free text
    Text(String),
}

/// One inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: UpdateKind,
}

impl Update {
    /// Build an update from raw message text, splitting out `/commands`.
    /// A `@botname` suffix on the command is dropped.
    pub fn from_text(user_id: UserId, chat_id: ChatId, text: &str) -> Self {
        let trimmed = text.trim();
        let kind = match trimmed.strip_prefix('/') {
            Some(rest) if !rest.is_empty() => {
                let mut parts = rest.split_whitespace();
                let head = parts.next().unwrap_or_default();
                let name = head.split('@').next().unwrap_or_default().to_lowercase();
                UpdateKind::Command {
                    name,
                    args: parts.map(ToString::to_string).collect(),
                }
            }
            _ => UpdateKind::Text(trimmed.to_string()),
        };
        Self {
            user_id,
            chat_id,
            kind,
        }
    }

    pub fn button(
        user_id: UserId,
        chat_id: ChatId,
        payload: impl Into<String>,
        callback_id: Option<String>,
        message: Option<MessageRef>,
    ) -> Self {
        Self {
            user_id,
            chat_id,
            kind: UpdateKind::Button {
                payload: payload.into(),
                callback_id,
                message,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("API rejected request: {0}")]
    Rejected(String),
}
