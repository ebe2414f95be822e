// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Frames sent from the Machine Agent to the Edge Router over the duplex channel.
///
/// Field casing matches the wire contract exactly, not Rust convention:
/// `apiKey`/`chatId` are camelCase while `command_id` stays snake_case, since
/// both shapes are load-bearing on the Agent side and neither is ours to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentFrame {
    #[serde(rename = "auth")]
    Auth {
        #[serde(rename = "apiKey")]
        api_key: String,
        #[serde(rename = "machineId")]
        machine_id: String,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "ack")]
    Ack { command_id: String },
    #[serde(rename = "commandResult")]
    CommandResult {
        command_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(rename = "chatId", skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
}

/// Frames sent from the Edge Router to the Machine Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouterFrame {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "command")]
    Command {
        command_id: String,
        session_id: String,
        command: String,
        chat_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_auth_frame_uses_wire_casing() {
        let frame = AgentFrame::Auth { api_key: "k".into(), machine_id: "m".into() };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"apiKey\":\"k\""));
        assert!(text.contains("\"type\":\"auth\""));
    }

    #[test]
    fn router_command_frame_round_trips() {
        let frame = RouterFrame::Command {
            command_id: "c1".into(),
            session_id: "s1".into(),
            command: "continue".into(),
            chat_id: "chat1".into(),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: RouterFrame = serde_json::from_str(&text).unwrap();
        match back {
            RouterFrame::Command { command_id, command, .. } => {
                assert_eq!(command_id, "c1");
                assert_eq!(command, "continue");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unrecognized_type_is_rejected_not_panicking() {
        let text = r#"{"type":"bogus"}"#;
        let result: Result<AgentFrame, _> = serde_json::from_str(text);
        assert!(result.is_err());
    }
}
