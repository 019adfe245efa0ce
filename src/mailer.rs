use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::MailConfig;

/// One outgoing plain-text email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail API rejected the message with status {0}")]
    Rejected(u16),
}

/// Mailer
///
/// Contract for sending transactional emails (verification links, password resets).
/// Handlers only see this trait, so the HTTP provider, the log-only mailer and the
/// test double are interchangeable.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// HttpMailer
///
/// Posts `{from, to, subject, text}` as JSON to a transactional mail API, authenticated
/// with a bearer key.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let body = OutgoingMail {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        };

        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !res.status().is_success() {
            return Err(MailError::Rejected(res.status().as_u16()));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "mail sent");
        Ok(())
    }
}

/// LogMailer
///
/// Local development mailer: writes the message to the log instead of sending it,
/// so verification and reset tokens can be copied from the console.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "mail not sent (no MAIL_API_URL configured)"
        );
        Ok(())
    }
}

/// MockMailer
///
/// Records every message for assertions. When `should_fail` is set, every send
/// returns an error.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<MailMessage>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Transport("Mock Mailer Error: Simulation requested".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(())
    }
}

/// Picks the HTTP mailer when an API is configured, otherwise the log mailer.
pub fn from_config(config: &MailConfig) -> MailerState {
    match (&config.api_url, &config.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpMailer::new(url, key, &config.from)),
        _ => Arc::new(LogMailer),
    }
}

// --- Message templates ---

pub fn verification_email(to: &str, frontend_url: &str, token: &str) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Confirma tu correo - Tecnicentro JR".to_string(),
        text: format!(
            "Hola,\n\nConfirma tu cuenta abriendo este enlace:\n{frontend_url}/verify-email?token={token}\n\n\
             Si no creaste esta cuenta, ignora este mensaje."
        ),
    }
}

pub fn password_reset_email(
    to: &str,
    frontend_url: &str,
    token: &str,
    ttl_minutes: i64,
) -> MailMessage {
    MailMessage {
        to: to.to_string(),
        subject: "Restablecer contraseña - Tecnicentro JR".to_string(),
        text: format!(
            "Hola,\n\nPara restablecer tu contraseña abre este enlace:\n{frontend_url}/reset-password?token={token}\n\n\
             El enlace vence en {ttl_minutes} minutos y solo puede usarse una vez."
        ),
    }
}

/// MailerState
///
/// The concrete type used to share the mailer across the application state.
pub type MailerState = Arc<dyn Mailer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_and_fails_on_demand() {
        let mailer = MockMailer::new();
        mailer
            .send(verification_email("ana@tecnicentrojr.co", "http://app", "tok123"))
            .await
            .unwrap();

        let last = mailer.last_to("ana@tecnicentrojr.co").unwrap();
        assert!(last.text.contains("http://app/verify-email?token=tok123"));

        let failing = MockMailer::new_failing();
        assert!(failing.send(last).await.is_err());
        assert!(failing.sent().is_empty());
    }
}
