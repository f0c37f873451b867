use crate::engine::{Engine, Inbound, Keyboard, Outbound, OutboundError, Reply};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, MessageId, ParseMode};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Reduces a Telegram message to what the engine reads. Messages without a
/// sender (channel posts) are ignored.
pub fn to_inbound(msg: &Message) -> Option<Inbound> {
    let user = msg.from()?;
    Some(Inbound {
        user_id: user.id.0,
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: msg.text().map(str::to_string),
        display_name: user.full_name(),
    })
}

pub async fn message_handler(msg: Message, engine: Arc<Engine>) -> HandlerResult {
    let Some(inbound) = to_inbound(&msg) else {
        return Ok(());
    };
    engine.handle(&inbound).await;
    Ok(())
}

fn reply_keyboard(rows: Vec<Vec<String>>) -> KeyboardMarkup {
    KeyboardMarkup::new(
        rows.into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
    )
    .resize_keyboard(true)
}

/// Delivers engine replies through the Bot API.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<(), OutboundError> {
        let mut request = self.bot.send_message(ChatId(chat_id), reply.text);
        if reply.markdown {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }
        request = match reply.keyboard {
            Keyboard::Keep => request,
            Keyboard::Menu(rows) => request.reply_markup(reply_keyboard(rows)),
            Keyboard::Remove => request.reply_markup(KeyboardRemove::new()),
        };

        request.await.map(|_| ()).map_err(|e| OutboundError::Request {
            chat_id,
            reason: e.to_string(),
        })
    }

    async fn copy(&self, to: i64, from: i64, message_id: i32) -> Result<(), OutboundError> {
        self.bot
            .copy_message(ChatId(to), ChatId(from), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(|e| OutboundError::Request {
                chat_id: to,
                reason: e.to_string(),
            })
    }
}
