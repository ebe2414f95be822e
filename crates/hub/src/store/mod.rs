// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod messages;
pub mod queue;
pub mod seen;
pub mod sessions;
pub mod tokens;

pub use messages::MessageStore;
pub use queue::{CommandQueueEntry, QueueStatus, QueueStore};
pub use seen::SeenUpdateStore;
pub use sessions::{RouterSession, SessionStore};
pub use tokens::{TokenStore, TokenValidation};
