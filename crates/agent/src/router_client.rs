// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-HTTP half of the Agent's connection to the Edge Router: session
//! registration and outbound notifications. The duplex WebSocket (`duplex.rs`)
//! carries only commands, pings, and acks — notifications travel this way
//! instead, mirroring the Router's own `/notifications` handler
//! (`relay-hub::transport::http::send_notification`).

use relay_wire::http::{
    RegisterSessionRequest, SendNotificationRequest, SendNotificationResponse,
    UnregisterSessionRequest,
};

#[derive(Debug, thiserror::Error)]
pub enum RouterClientError {
    #[error("request to edge router failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("edge router rejected the request: {0}")]
    Rejected(String),
}

pub struct RouterClient {
    client: reqwest::Client,
    base_url: String,
    shared_api_key: String,
}

impl RouterClient {
    pub fn new(base_url: String, shared_api_key: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, shared_api_key }
    }

    pub async fn register_session(&self, session_id: &str, machine_id: &str, label: Option<&str>) -> Result<(), RouterClientError> {
        let request = RegisterSessionRequest { session_id: session_id.to_owned(), machine_id: machine_id.to_owned(), label: label.map(str::to_owned) };
        self.post_json("/sessions", &request).await.map(|_: serde_json::Value| ())
    }

    pub async fn unregister_session(&self, session_id: &str) -> Result<(), RouterClientError> {
        let request = UnregisterSessionRequest { session_id: session_id.to_owned() };
        self.post_json("/sessions/unregister", &request).await.map(|_: serde_json::Value| ())
    }

    pub async fn send_notification(&self, request: &SendNotificationRequest) -> Result<SendNotificationResponse, RouterClientError> {
        self.post_json("/notifications", request).await
    }

    async fn post_json<B: serde::Serialize, R: serde::de::DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, RouterClientError> {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.shared_api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RouterClientError::Rejected(text));
        }
        Ok(response.json().await?)
    }
}
