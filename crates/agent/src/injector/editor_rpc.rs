// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivers text into an editor's embedded terminal buffer over its
//! msgpack-RPC socket (`nvim --listen <socket_path>`). Grounded on
//! `sven-tui::nvim::bridge::NvimBridge`'s `nvim-rs` usage, connecting over the
//! descriptor's Unix socket rather than spawning a child process, and calling
//! a single RPC method (`nvim_buf_set_lines`, via `Buffer::set_lines`)
//! against the named buffer instead of driving a full redraw-grid UI.

use std::time::Duration;

use async_trait::async_trait;
use nvim_rs::compat::tokio::Compat;
use nvim_rs::create::tokio as create;
use nvim_rs::{Handler, Neovim};
use rmpv::Value;
use tokio::net::unix::OwnedWriteHalf;

use super::{Inject, InjectError};
use crate::registry::TransportDescriptor;

pub struct EditorRpcInjector {
    timeout: Duration,
}

impl EditorRpcInjector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Inject for EditorRpcInjector {
    async fn inject(&self, descriptor: &TransportDescriptor, text: &str) -> Result<(), InjectError> {
        let TransportDescriptor::TerminalEditorRpc { socket_path, buffer_identifier } = descriptor else {
            return Err(InjectError::NoTransport);
        };
        tokio::time::timeout(self.timeout, paste(socket_path, buffer_identifier, text))
            .await
            .map_err(|_| InjectError::Timeout(self.timeout))?
    }
}

/// No-op RPC handler: this connection only ever issues requests, it never
/// needs to react to notifications or reverse requests from Neovim.
#[derive(Clone)]
struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    type Writer = Compat<OwnedWriteHalf>;

    async fn handle_request(&self, _name: String, _args: Vec<Value>, _neovim: Neovim<Self::Writer>) -> Result<Value, Value> {
        Ok(Value::Nil)
    }

    async fn handle_notify(&self, _name: String, _args: Vec<Value>, _neovim: Neovim<Self::Writer>) {}
}

async fn paste(socket_path: &str, buffer_identifier: &str, text: &str) -> Result<(), InjectError> {
    let (neovim, _io_handle) =
        create::new_unix_socket(socket_path, NoopHandler).await.map_err(|e| InjectError::Adapter(e.to_string()))?;

    let buffers = neovim.list_bufs().await.map_err(|e| InjectError::Adapter(e.to_string()))?;
    let mut target = None;
    for buf in buffers {
        let name = buf.get_name().await.map_err(|e| InjectError::Adapter(e.to_string()))?;
        if name == buffer_identifier {
            target = Some(buf);
            break;
        }
    }
    let buf = target.ok_or_else(|| InjectError::Adapter(format!("no buffer named {buffer_identifier}")))?;

    let line_count = buf.line_count().await.map_err(|e| InjectError::Adapter(e.to_string()))?;
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    buf.set_lines(line_count, line_count, false, lines).await.map_err(|e| InjectError::Adapter(e.to_string()))?;
    Ok(())
}
