// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Notifier` implementations: a structured-logging default and a no-op,
//! for embedding this engine without wiring a real chat backend.

use async_trait::async_trait;
use dispatch_core::{NotificationKind, NotificationPayload, Notifier};
use tracing::info;

/// Logs every notification at `info` with structured fields; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, kind: NotificationKind, payload: NotificationPayload) {
        info!(
            kind = %kind,
            identifier = %payload.identifier,
            status = %payload.status,
            attempt = ?payload.attempt,
            reason = ?payload.reason,
            "dispatch notification"
        );
    }
}

/// Discards every notification. Useful for tests that only care about
/// state transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _kind: NotificationKind, _payload: NotificationPayload) {}
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    pub struct NotifyCall {
        pub kind: NotificationKind,
        pub payload: NotificationPayload,
    }

    /// Records every call in order; inspect with [`FakeNotifier::calls`].
    #[derive(Clone, Default)]
    pub struct FakeNotifier {
        calls: Arc<Mutex<Vec<NotifyCall>>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, kind: NotificationKind, payload: NotificationPayload) {
            self.calls.lock().push(NotifyCall { kind, payload });
        }
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifyCall> {
            self.calls.lock().clone()
        }

        pub fn kinds(&self) -> Vec<NotificationKind> {
            self.calls.lock().iter().map(|c| c.kind).collect()
        }

        pub fn count(&self, kind: NotificationKind) -> usize {
            self.calls.lock().iter().filter(|c| c.kind == kind).count()
        }
    }
}
