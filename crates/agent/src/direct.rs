// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Degraded direct-to-chat path, used only when no Edge Router is configured.
//! Speaks the chat platform's HTTP API directly over `reqwest` rather than
//! pulling in the full `teloxide` client the Router uses (`relay-hub::chat`)
//! — this path never needs update polling or webhook parsing, only sends.

use relay_wire::http::{ReplyButton, ReplyMarkup};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum DirectSendError {
    #[error("no bot token configured for direct mode")]
    Unconfigured,
    #[error("chat platform request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat platform rejected the request: {0}")]
    Rejected(String),
}

pub struct DirectNotifier {
    client: reqwest::Client,
    bot_token: String,
}

impl DirectNotifier {
    pub fn new(bot_token: Option<String>) -> Option<Self> {
        let bot_token = bot_token?;
        Some(Self { client: reqwest::Client::new(), bot_token })
    }

    pub async fn send_text(&self, chat_id: &str, text: &str, markup: Option<&ReplyMarkup>) -> Result<String, DirectSendError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = markup {
            body["reply_markup"] = json!({ "inline_keyboard": [inline_row(&markup.buttons)] });
        }

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        if !status.is_success() || payload.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = payload.get("description").and_then(|v| v.as_str()).unwrap_or("unknown error").to_owned();
            return Err(DirectSendError::Rejected(description));
        }
        let message_id = payload
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .unwrap_or_default();
        Ok(message_id)
    }
}

fn inline_row(buttons: &[ReplyButton]) -> Vec<serde_json::Value> {
    buttons.iter().map(|b| json!({ "text": b.label, "callback_data": b.action })).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_without_token() {
        assert!(DirectNotifier::new(None).is_none());
    }

    #[test]
    fn configured_with_token() {
        assert!(DirectNotifier::new(Some("dummy:token".into())).is_some());
    }
}
