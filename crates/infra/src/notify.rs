//! Notifier adapters.
//!
//! There is no mail/SMS gateway: codes and links go to the structured log.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use capita_auth::{AuthError, AuthResult, Identity, Notifier, VerificationCode, VerificationLink};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_mfa_code(&self, to: &Identity, code: &VerificationCode) -> AuthResult<()> {
        info!(
            user_id = %to.id,
            phone = to.phone.as_deref().unwrap_or("-"),
            code = %code.code,
            expires_at = %code.expires_at,
            "verification code issued"
        );
        Ok(())
    }

    async fn send_verification_link(&self, to: &Identity, link: &VerificationLink) -> AuthResult<()> {
        info!(
            user_id = %to.id,
            email = %to.email,
            kind = %link.kind,
            url = %link.url,
            "verification link issued"
        );
        Ok(())
    }
}

/// Something a [`RecordingNotifier`] was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Code { email: String, code: VerificationCode },
    Link { email: String, link: VerificationLink },
}

/// Keeps every delivery in memory; lets tests read what a user would receive.
///
/// While offline every send fails with `Unexpected` and nothing is recorded.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Delivery>>,
    offline: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent code sent to `email`.
    pub fn last_code_for(&self, email: &str) -> Option<VerificationCode> {
        self.deliveries().into_iter().rev().find_map(|d| match d {
            Delivery::Code { email: to, code } if to == email => Some(code),
            _ => None,
        })
    }

    /// Most recent link sent to `email`.
    pub fn last_link_for(&self, email: &str) -> Option<VerificationLink> {
        self.deliveries().into_iter().rev().find_map(|d| match d {
            Delivery::Link { email: to, link } if to == email => Some(link),
            _ => None,
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn record(&self, delivery: Delivery) -> AuthResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::unexpected("delivery gateway offline"));
        }
        self.sent
            .lock()
            .map_err(|_| AuthError::unexpected("notifier lock poisoned"))?
            .push(delivery);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_mfa_code(&self, to: &Identity, code: &VerificationCode) -> AuthResult<()> {
        self.record(Delivery::Code {
            email: to.email.clone(),
            code: code.clone(),
        })
    }

    async fn send_verification_link(&self, to: &Identity, link: &VerificationLink) -> AuthResult<()> {
        self.record(Delivery::Link {
            email: to.email.clone(),
            link: link.clone(),
        })
    }
}
