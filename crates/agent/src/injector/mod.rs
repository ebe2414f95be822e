// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command Injector: delivers a command's text into the terminal the session
//! is actually running in. Three adapters, selected and chained per
//! `spec.md §4.4`: editor-rpc first, falling back to multiplexer if present,
//! multiplexer directly if that is the session's primary kind, and pty only
//! when neither is available. Grounded on the pack's `Backend` trait
//! (`cli::pty::attach`), generalized from PTY I/O to one-shot text delivery.

mod editor_rpc;
mod multiplexer;
mod pty;

use async_trait::async_trait;

use crate::registry::TransportDescriptor;

pub use editor_rpc::EditorRpcInjector;
pub use multiplexer::MultiplexerInjector;
pub use pty::PseudoTerminalInjector;

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("no usable transport for this session")]
    NoTransport,
    #[error("adapter failed: {0}")]
    Adapter(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A single adapter capable of delivering text into one transport kind.
#[async_trait]
pub trait Inject: Send + Sync {
    async fn inject(&self, descriptor: &TransportDescriptor, text: &str) -> Result<(), InjectError>;
}

/// Picks the adapter chain for a session's descriptor and tries each in turn.
/// Adapter failures are never retried here; the caller decides what to do
/// with the final error (leave the inbox entry unmarked, emit a result frame).
pub struct Injector {
    editor_rpc: EditorRpcInjector,
    multiplexer: MultiplexerInjector,
    pty: PseudoTerminalInjector,
}

impl Injector {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            editor_rpc: EditorRpcInjector::new(timeout),
            multiplexer: MultiplexerInjector::new(timeout),
            pty: PseudoTerminalInjector::new(timeout),
        }
    }

    pub async fn inject(
        &self,
        primary: &TransportDescriptor,
        fallback: Option<&TransportDescriptor>,
        text: &str,
    ) -> Result<(), InjectError> {
        match primary {
            TransportDescriptor::TerminalEditorRpc { .. } => {
                match self.editor_rpc.inject(primary, text).await {
                    Ok(()) => Ok(()),
                    Err(primary_err) => match fallback {
                        Some(fb @ TransportDescriptor::TerminalMultiplexer { .. }) => self.multiplexer.inject(fb, text).await,
                        _ => Err(primary_err),
                    },
                }
            }
            TransportDescriptor::TerminalMultiplexer { .. } => self.multiplexer.inject(primary, text).await,
            TransportDescriptor::PseudoTerminal { .. } => self.pty.inject(primary, text).await,
            TransportDescriptor::Unknown => Err(InjectError::NoTransport),
        }
    }
}
