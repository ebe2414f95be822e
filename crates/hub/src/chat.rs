// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Abstract chat-provider capability.
//!
//! The source splits notification formatting, sending, reply parsing, and
//! routing across one monolithic handler. Here sending is its own narrow
//! capability so the router orchestrator can mediate between it and the
//! duplex hub without caring which chat platform is behind it.

use relay_wire::http::ReplyMarkup;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::Bot;

/// Capability flags a provider declares so callers can adapt behavior instead
/// of guessing (e.g. whether inline keyboards are supported at all).
#[derive(Debug, Clone, Copy)]
pub struct ChatCapabilities {
    pub inline_keyboards: bool,
}

#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    fn capabilities(&self) -> ChatCapabilities;

    /// Send plain text (no parse mode) with an optional inline keyboard.
    /// Returns the platform message id so it can be bound for reply routing.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> anyhow::Result<String>;
}

pub struct TelegramProvider {
    bot: Bot,
}

impl TelegramProvider {
    pub fn new(token: &str) -> Self {
        Self { bot: Bot::new(token) }
    }
}

#[async_trait::async_trait]
impl ChatProvider for TelegramProvider {
    fn capabilities(&self) -> ChatCapabilities {
        ChatCapabilities { inline_keyboards: true }
    }

    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&ReplyMarkup>,
    ) -> anyhow::Result<String> {
        let id: i64 = chat_id.parse()?;
        let mut request = self.bot.send_message(ChatId(id), text);

        if let Some(markup) = markup {
            let row: Vec<InlineKeyboardButton> = markup
                .buttons
                .iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.clone()))
                .collect();
            request = request.reply_markup(InlineKeyboardMarkup::new([row]));
        }

        let message = request.await?;
        Ok(message.id.0.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_provider_declares_inline_keyboard_support() {
        let provider = TelegramProvider::new("dummy:token");
        assert!(provider.capabilities().inline_keyboards);
    }
}
