use super::{DeliveryFailure, DeliveryOutcome, MailDelivery, OutboundMessage};
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

/// Delivers through an SMTP relay. The transport is built on first use and then reused.
pub struct SmtpMailer {
    smtp_url: String,
    credentials: Option<SmtpCredentials>,
    transport: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpMailer {
    pub fn new(smtp_url: impl Into<String>, credentials: Option<SmtpCredentials>) -> Self {
        Self {
            smtp_url: smtp_url.into(),
            credentials,
            transport: Default::default(),
        }
    }

    async fn initialise_transport(
        &self,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, lettre::transport::smtp::Error> {
        info!("Connecting to SMTP relay {}", self.smtp_url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)?
            .authentication(vec![Mechanism::Plain]);

        // Credentials only ever travel over implicit TLS or mandatory STARTTLS.
        match &self.credentials {
            Some(credentials) if is_encrypted_url(&self.smtp_url) => {
                builder = builder.credentials(Credentials::new(
                    credentials.username.clone(),
                    credentials.password.clone(),
                ));
            }
            Some(_) => warn!("Not sending SMTP credentials over a connection without TLS"),
            None => {}
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl MailDelivery for SmtpMailer {
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let email = match build_email(message) {
            Ok(email) => email,
            Err(description) => {
                error!("{description}");
                return DeliveryOutcome::Failed(DeliveryFailure::Unavailable(description));
            }
        };
        let transport = match self
            .transport
            .get_or_try_init(self.initialise_transport())
            .await
        {
            Ok(transport) => transport,
            Err(error) => {
                return DeliveryOutcome::Failed(DeliveryFailure::Unavailable(format!(
                    "Unable to set up SMTP transport: {error}"
                )))
            }
        };
        match transport.send(email).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(error) => DeliveryOutcome::Failed(DeliveryFailure::Unavailable(format!(
                "Error sending message: {error}"
            ))),
        }
    }
}

/// Whether a relay URL in lettre's format guarantees an encrypted session: either `smtps://` or
/// `smtp://` with `tls=required`.
pub fn is_encrypted_url(smtp_url: &str) -> bool {
    if smtp_url.starts_with("smtps://") {
        return true;
    }
    smtp_url.starts_with("smtp://")
        && smtp_url
            .split_once('?')
            .is_some_and(|(_, query)| query.split('&').any(|pair| pair == "tls=required"))
}

fn build_email(message: &OutboundMessage) -> Result<Message, String> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|error| format!("Invalid sender {}: {error}", message.from))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|error| format!("Invalid recipient {}: {error}", message.to))?;
    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str());
    if let Some(reply_to) = &message.reply_to {
        let address: Address = reply_to
            .email
            .parse()
            .map_err(|error| format!("Invalid reply-to address {}: {error}", reply_to.email))?;
        builder = builder.reply_to(Mailbox::new(reply_to.name.clone(), address));
    }
    match &message.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            html.clone(),
        )),
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.text.clone()),
    }
    .map_err(|error| format!("Error building message: {error}"))
}
