//! Outbound delivery of password-reset tokens.

use std::sync::Arc;

use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use parking_lot::Mutex;
use thiserror::Error;

use crate::auth::config::EmailSettings;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("could not build message: {0}")]
    Message(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Hands a freshly issued reset token to its owner.
#[rocket::async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn deliver_reset_token(&self, recipient: &str, token: &str) -> Result<(), DeliveryError>;
}

pub type SharedNotifier = Arc<dyn ResetNotifier>;

/// SMTP notifier. Runs in no-op mode (log only) when no host is configured.
#[derive(Clone)]
pub struct EmailNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(settings: &EmailSettings) -> Result<Self, DeliveryError> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|err| DeliveryError::Address(format!("TRACKER_SMTP_FROM: {err}")))?;

        let transport = if !settings.is_enabled() {
            log::warn!("SMTP host not configured; reset emails will only be logged");
            None
        } else {
            let builder = if settings.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            }
            .map_err(|err| DeliveryError::Transport(err.to_string()))?
            .port(settings.port);

            let builder = if settings.username.is_empty() {
                builder
            } else {
                builder.credentials(Credentials::new(
                    settings.username.clone(),
                    settings.password.clone(),
                ))
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[rocket::async_trait]
impl ResetNotifier for EmailNotifier {
    async fn deliver_reset_token(&self, recipient: &str, token: &str) -> Result<(), DeliveryError> {
        let Some(transport) = &self.transport else {
            log::info!("no-op notifier: skipping reset email to {}", recipient);
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|err| DeliveryError::Address(err.to_string()))?;
        let body = format!(
            "We received a request to reset your password.\n\n\
             Your reset token is:\n\n    {token}\n\n\
             It expires in one hour. If you did not ask for this, ignore this email."
        );

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Password reset")
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|err| DeliveryError::Message(err.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        log::info!("reset email sent to {}", recipient);
        Ok(())
    }
}

/// Keeps delivered tokens in memory. Used by tests and local runs that need
/// to read the token back.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }

    pub fn last_token_for(&self, recipient: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(to, _)| to.eq_ignore_ascii_case(recipient))
            .map(|(_, token)| token.clone())
    }

    pub fn delivered(&self) -> usize {
        self.sent.lock().len()
    }
}

#[rocket::async_trait]
impl ResetNotifier for RecordingNotifier {
    async fn deliver_reset_token(&self, recipient: &str, token: &str) -> Result<(), DeliveryError> {
        if *self.fail.lock() {
            return Err(DeliveryError::Transport("simulated outage".into()));
        }
        self.sent
            .lock()
            .push((recipient.to_string(), token.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_means_no_op() {
        let settings = EmailSettings {
            from: "Tracker <no-reply@localhost>".into(),
            ..EmailSettings::default()
        };
        let notifier = EmailNotifier::new(&settings).expect("notifier");
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn rejects_invalid_sender() {
        let settings = EmailSettings {
            from: "not an address".into(),
            ..EmailSettings::default()
        };
        assert!(matches!(
            EmailNotifier::new(&settings),
            Err(DeliveryError::Address(_))
        ));
    }

    #[tokio::test]
    async fn no_op_delivery_succeeds() {
        let settings = EmailSettings {
            from: "Tracker <no-reply@localhost>".into(),
            ..EmailSettings::default()
        };
        let notifier = EmailNotifier::new(&settings).expect("notifier");
        notifier
            .deliver_reset_token("a@x.com", "token")
            .await
            .expect("no-op send");
    }

    #[tokio::test]
    async fn recording_notifier_keeps_latest_token() {
        let notifier = RecordingNotifier::new();
        notifier.deliver_reset_token("a@x.com", "one").await.expect("send");
        notifier.deliver_reset_token("A@x.com", "two").await.expect("send");
        assert_eq!(notifier.last_token_for("a@x.com").as_deref(), Some("two"));
        assert_eq!(notifier.delivered(), 2);

        notifier.set_failing(true);
        assert!(notifier.deliver_reset_token("a@x.com", "three").await.is_err());
        assert_eq!(notifier.delivered(), 2);
    }
}
