//! Recording mailer for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Mailer, NotificationError, OutgoingEmail};

/// Records delivered emails; can be switched to fail.
///
/// Clones share the outbox and the switch, so a test keeps one clone and hands
/// another to the system under test.
#[derive(Debug, Clone)]
pub struct RecordingMailer {
    should_succeed: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl RecordingMailer {
    /// A mailer that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self {
            should_succeed: Arc::new(AtomicBool::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mailer that rejects everything
    #[must_use]
    pub fn failing() -> Self {
        let mailer = Self::new();
        mailer.set_should_succeed(false);
        mailer
    }

    /// Flip between accepting and rejecting
    pub fn set_should_succeed(&self, should_succeed: bool) {
        self.should_succeed.store(should_succeed, Ordering::SeqCst);
    }

    /// Emails accepted so far, oldest first
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent email to `to`
    #[must_use]
    pub fn last_to(&self, to: &str) -> Option<OutgoingEmail> {
        self.sent().into_iter().rev().find(|e| e.to == to)
    }
}

impl Default for RecordingMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        if !self.should_succeed.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport(format!(
                "mock transport rejected mail to {}",
                email.to
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email);
        Ok(())
    }
}
