mod resend;
mod smtp;

pub use resend::{ResendMailer, RESEND_API_URL};
pub use smtp::{is_encrypted_url, SmtpCredentials, SmtpMailer};
#[cfg(test)]
pub use smtp::test_support;

use async_trait::async_trait;

/// A fully rendered email, independent of the provider delivering it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub reply_to: Option<ReplyTo>,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTo {
    pub name: Option<String>,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(DeliveryFailure),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The provider answered but refused the message.
    Rejected { detail: String },
    /// The message could not be built or handed over to the provider.
    Unavailable(String),
}

#[async_trait]
pub trait MailDelivery: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome;
}

/// The provider selected by the deployment's configuration.
pub enum Mailer {
    Resend(ResendMailer),
    Smtp(SmtpMailer),
}

#[async_trait]
impl MailDelivery for Mailer {
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        match self {
            Mailer::Resend(mailer) => mailer.deliver(message).await,
            Mailer::Smtp(mailer) => mailer.deliver(message).await,
        }
    }
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryFailure::Rejected { detail } => write!(f, "Rejected by provider: {detail}"),
            DeliveryFailure::Unavailable(error) => write!(f, "Delivery unavailable: {error}"),
        }
    }
}

impl std::error::Error for DeliveryFailure {}
