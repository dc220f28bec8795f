use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Outbound e-mail collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Logs the envelope of each message instead of delivering it. Bodies can
/// carry live reset links, so they never reach the log.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Outbound mail not delivered"
        );
        Ok(())
    }
}

/// Keeps every message in memory; can be switched to fail delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, address: &str) -> Option<MailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == address)
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if self.failing.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(MailError::Transport("delivery disabled".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| MailError::Transport(e.to_string()))?
            .push(message);
        Ok(())
    }
}

pub fn welcome_message(name: &str, email: &str, profile_url: &str) -> MailMessage {
    MailMessage {
        to: email.to_string(),
        subject: "Welcome to the Natours Family!".to_string(),
        body: format!(
            "Hi {},\n\nWelcome to Natours, we're glad to have you.\nYou can manage your account at {}\n",
            first_name(name),
            profile_url
        ),
    }
}

pub fn password_reset_message(name: &str, email: &str, reset_url: &str, ttl_minutes: i64) -> MailMessage {
    MailMessage {
        to: email.to_string(),
        subject: format!("Your password reset token (valid for {} min)", ttl_minutes),
        body: format!(
            "Hi {},\n\nForgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {}\nIf you didn't forget your password, please ignore this email!\n",
            first_name(name),
            reset_url
        ),
    }
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}
