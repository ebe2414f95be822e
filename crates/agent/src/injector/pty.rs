// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Last-resort adapter: writes raw bytes to the session's pseudo-terminal
//! device file. Used when neither an editor-rpc socket nor a multiplexer
//! pane is known for the session.

use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{InjectError, Inject};
use crate::registry::TransportDescriptor;

pub struct PseudoTerminalInjector {
    timeout: Duration,
}

impl PseudoTerminalInjector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Inject for PseudoTerminalInjector {
    async fn inject(&self, descriptor: &TransportDescriptor, text: &str) -> Result<(), InjectError> {
        let TransportDescriptor::PseudoTerminal { device_path } = descriptor else {
            return Err(InjectError::NoTransport);
        };
        tokio::time::timeout(self.timeout, write_line(device_path, text))
            .await
            .map_err(|_| InjectError::Timeout(self.timeout))?
    }
}

async fn write_line(device_path: &str, text: &str) -> Result<(), InjectError> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(device_path)
        .await
        .map_err(|e| InjectError::Adapter(e.to_string()))?;
    file.write_all(text.as_bytes()).await.map_err(|e| InjectError::Adapter(e.to_string()))?;
    file.write_all(b"\n").await.map_err(|e| InjectError::Adapter(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrong_descriptor_kind_is_rejected() {
        let injector = PseudoTerminalInjector::new(Duration::from_secs(1));
        let descriptor = TransportDescriptor::Unknown;
        let result = injector.inject(&descriptor, "hi").await;
        assert!(matches!(result, Err(InjectError::NoTransport)));
    }

    #[tokio::test]
    async fn missing_device_surfaces_adapter_error() {
        let injector = PseudoTerminalInjector::new(Duration::from_secs(1));
        let descriptor = TransportDescriptor::PseudoTerminal { device_path: "/dev/does-not-exist-relay".into() };
        let result = injector.inject(&descriptor, "hi").await;
        assert!(matches!(result, Err(InjectError::Adapter(_))));
    }
}
