use super::{DeliveryFailure, DeliveryOutcome, MailDelivery, OutboundMessage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::error;

pub const RESEND_API_URL: &str = "https://api.resend.com";

/// Delivers through the Resend transactional email API.
pub struct ResendMailer {
    client: Client,
    api_key: String,
    api_url: String,
}

#[derive(Serialize)]
struct SendEmailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    text: &'a str,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    fn emails_url(&self) -> String {
        format!("{}/emails", self.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl MailDelivery for ResendMailer {
    async fn deliver(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let payload = SendEmailPayload {
            from: &message.from,
            to: [&message.to],
            reply_to: message.reply_to.as_ref().map(|reply_to| reply_to.email.as_str()),
            subject: &message.subject,
            html: message.html.as_deref(),
            text: &message.text,
        };
        let response = match self
            .client
            .post(self.emails_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return DeliveryOutcome::Failed(DeliveryFailure::Unavailable(format!(
                    "Error calling Resend: {error}"
                )))
            }
        };
        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }
        let detail = response.text().await.unwrap_or_default();
        error!("Resend refused message with status {status}: {detail}");
        DeliveryOutcome::Failed(DeliveryFailure::Rejected { detail })
    }
}

#[cfg(test)]
mod tests {
    use super::ResendMailer;
    use crate::delivery::{
        DeliveryFailure, DeliveryOutcome, MailDelivery, OutboundMessage, ReplyTo,
    };
    use googletest::prelude::*;
    use serde_json::json;
    use test_support::fake_resend::FakeResend;

    const API_KEY: &str = "re_arbitrary_key";

    fn arbitrary_message() -> OutboundMessage {
        OutboundMessage {
            from: "Web contact form <no-reply@example.com>".into(),
            to: "team@example.com".into(),
            reply_to: Some(ReplyTo {
                name: Some("Ada".into()),
                email: "ada@example.com".into(),
            }),
            subject: "[Contact] Hello".into(),
            text: "Hello there".into(),
            html: Some("<p>Hello there</p>".into()),
        }
    }

    #[tokio::test]
    async fn posts_message_to_api() -> Result<()> {
        let fake_resend = FakeResend::new(API_KEY);
        let mailer = ResendMailer::new(API_KEY, fake_resend.serve().await);

        let outcome = mailer.deliver(&arbitrary_message()).await;

        verify_that!(outcome, eq(DeliveryOutcome::Delivered))?;
        verify_that!(
            fake_resend.received_messages(),
            elements_are![eq(json!({
                "from": "Web contact form <no-reply@example.com>",
                "to": ["team@example.com"],
                "reply_to": "ada@example.com",
                "subject": "[Contact] Hello",
                "html": "<p>Hello there</p>",
                "text": "Hello there",
            }))]
        )
    }

    #[tokio::test]
    async fn omits_absent_optional_fields() -> Result<()> {
        let fake_resend = FakeResend::new(API_KEY);
        let mailer = ResendMailer::new(API_KEY, fake_resend.serve().await);
        let message = OutboundMessage {
            reply_to: None,
            html: None,
            ..arbitrary_message()
        };

        mailer.deliver(&message).await;

        verify_that!(
            fake_resend.received_messages(),
            elements_are![predicate(|payload: &serde_json::Value| {
                payload.get("reply_to").is_none() && payload.get("html").is_none()
            })]
        )
    }

    #[tokio::test]
    async fn reports_provider_detail_when_refused() -> Result<()> {
        let fake_resend = FakeResend::new(API_KEY).fail_with(422, "Invalid `to` field");
        let mailer = ResendMailer::new(API_KEY, fake_resend.serve().await);

        let outcome = mailer.deliver(&arbitrary_message()).await;

        verify_that!(
            outcome,
            eq(DeliveryOutcome::Failed(DeliveryFailure::Rejected {
                detail: "Invalid `to` field".into()
            }))
        )
    }

    #[tokio::test]
    async fn authenticates_with_api_key() -> Result<()> {
        let fake_resend = FakeResend::new("a different key");
        let mailer = ResendMailer::new(API_KEY, fake_resend.serve().await);

        let outcome = mailer.deliver(&arbitrary_message()).await;

        verify_that!(
            outcome,
            matches_pattern!(DeliveryOutcome::Failed(matches_pattern!(
                DeliveryFailure::Rejected {
                    detail: contains_substring("API key is invalid")
                }
            )))
        )
    }

    #[tokio::test]
    async fn reports_unavailable_when_api_unreachable() -> Result<()> {
        let mailer = ResendMailer::new(API_KEY, "http://127.0.0.1:9");

        let outcome = mailer.deliver(&arbitrary_message()).await;

        verify_that!(
            outcome,
            matches_pattern!(DeliveryOutcome::Failed(matches_pattern!(
                DeliveryFailure::Unavailable(anything())
            )))
        )
    }
}
