//! The engine's view of the chat platform: what comes in, what goes out.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// One inbound message, stripped down to what the flows look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub user_id: u64,
    pub chat_id: i64,
    pub message_id: i32,
    /// `None` for photos, stickers and other non-text content.
    pub text: Option<String>,
    pub display_name: String,
}

impl Inbound {
    /// A private-chat text message, where the chat id equals the user id.
    ///
    /// Telegram user ids fit in 52 bits; an id past `i64::MAX` is not a
    /// Telegram user and gets chat id 0, which every send rejects.
    pub fn text(user_id: u64, text: impl Into<String>) -> Self {
        let chat_id = i64::try_from(user_id).unwrap_or_else(|_| {
            warn!("User id {} does not fit a chat id", user_id);
            0
        });
        Self {
            user_id,
            chat_id,
            message_id: 0,
            text: Some(text.into()),
            display_name: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_message_id(mut self, message_id: i32) -> Self {
        self.message_id = message_id;
        self
    }

    /// The message text, or an empty string for non-text content.
    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// What happens to the reply keyboard with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    #[default]
    Keep,
    Menu(Vec<Vec<String>>),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Text is MarkdownV2 and already escaped.
    pub markdown: bool,
    pub keyboard: Keyboard,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
            keyboard: Keyboard::Keep,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::plain(text)
        }
    }

    pub fn menu(mut self, rows: Vec<Vec<String>>) -> Self {
        self.keyboard = Keyboard::Menu(rows);
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Keyboard::Remove;
        self
    }
}

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("send to chat {chat_id} failed: {reason}")]
    Request { chat_id: i64, reason: String },
}

/// Delivery side of the bot platform.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<(), OutboundError>;

    /// Re-sends an existing message verbatim to another chat.
    async fn copy(&self, to: i64, from: i64, message_id: i32) -> Result<(), OutboundError>;
}
