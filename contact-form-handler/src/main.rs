mod config;
mod delivery;
mod message;
mod response;
mod secrets;
mod submission;
mod turnstile;
mod validation;

use chrono::{SecondsFormat, Utc};
use config::{Config, DeliveryConfig};
use delivery::{
    DeliveryFailure, DeliveryOutcome, MailDelivery, Mailer, ResendMailer, SmtpMailer,
};
use lambda_http::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    run, service_fn, Body, Error, Request, Response,
};
use message::{compose_auto_reply, compose_notification};
use response::{map_outcome, map_rejection, HandlerResponse};
use secrets::AwsSecretsManagerSecretRepository;
use serde_json::json;
use std::borrow::Cow;
use submission::{normalize, CanonicalFields};
use tracing::{error, info, warn};
use turnstile::{TokenVerifier, TurnstileVerifier};
use validation::{validate, RejectionReason, ValidationOutcome};

const PING_PATH_SUFFIX: &str = "/ping";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::load::<AwsSecretsManagerSecretRepository>().await;
    let handler = ContactFormHandler::from_config(config);
    run(service_fn(|event| handler.handle(event))).await
}

struct ContactFormHandler<VerifierT: TokenVerifier, MailerT: MailDelivery> {
    config: Config,
    verifier: Option<VerifierT>,
    mailer: Option<MailerT>,
}

impl ContactFormHandler<TurnstileVerifier, Mailer> {
    fn from_config(config: Config) -> Self {
        let verifier = config.captcha.secret.as_ref().map(|secret| {
            TurnstileVerifier::new(secret.as_str(), config.captcha.verify_url.as_str())
        });
        let mailer = config.delivery.as_ref().map(|delivery| match delivery {
            DeliveryConfig::Resend { api_key, api_url } => {
                Mailer::Resend(ResendMailer::new(api_key.as_str(), api_url.as_str()))
            }
            DeliveryConfig::Smtp { url, credentials } => {
                Mailer::Smtp(SmtpMailer::new(url.as_str(), credentials.clone()))
            }
        });
        let missing = config.missing_settings();
        if !missing.is_empty() {
            warn!(
                "Contact form is not configured, missing {}",
                missing.join(", ")
            );
        }
        Self::new(config, verifier, mailer)
    }
}

impl<VerifierT: TokenVerifier, MailerT: MailDelivery> ContactFormHandler<VerifierT, MailerT> {
    fn new(config: Config, verifier: Option<VerifierT>, mailer: Option<MailerT>) -> Self {
        Self {
            config,
            verifier,
            mailer,
        }
    }

    async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let method = event.method();
        let mut response = if *method == Method::OPTIONS && self.cors_enabled() {
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
                .body(Body::Empty)?
        } else if event.uri().path().ends_with(PING_PATH_SUFFIX) {
            ping(method).into_response()?
        } else {
            let content_type = event
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            self.process(method, content_type, &body_text(event.body()))
                .await
                .into_response()?
        };
        let origin = event
            .headers()
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok());
        self.apply_cors(response.headers_mut(), origin);
        Ok(response)
    }

    async fn process(&self, method: &Method, content_type: &str, body: &str) -> HandlerResponse {
        if *method != Method::POST {
            return map_rejection(&RejectionReason::MethodNotAllowed);
        }
        let (Some(recipient), Some(mailer), true) = (
            self.config.recipient.as_deref(),
            self.mailer.as_ref(),
            self.captcha_configured() && !self.config.sends_smtp_credentials_unencrypted(),
        ) else {
            error!(
                "Refusing submission, server not configured: missing {}",
                self.config.missing_settings().join(", ")
            );
            return map_rejection(&RejectionReason::ServerMisconfigured);
        };

        let fields = normalize(content_type, body, &self.config.aliases);
        let verifier = self
            .verifier
            .as_ref()
            .map(|verifier| verifier as &dyn TokenVerifier);
        let outcome = validate(fields, verifier).await;
        let fields = match &outcome {
            ValidationOutcome::Accepted(fields) => fields,
            ValidationOutcome::Rejected(RejectionReason::HoneypotTriggered) => {
                // The message is dropped, but the caller is told it was sent.
                info!("Discarding submission caught by honeypot");
                return map_outcome(&outcome, None);
            }
            ValidationOutcome::Rejected(reason) => {
                info!("Rejecting submission: {reason}");
                return map_outcome(&outcome, None);
            }
        };

        let delivery = self.deliver(fields, recipient, mailer).await;
        map_outcome(&outcome, Some(&delivery))
    }

    async fn deliver(
        &self,
        fields: &CanonicalFields,
        recipient: &str,
        mailer: &MailerT,
    ) -> DeliveryOutcome {
        let notification = match compose_notification(fields, &self.config.sender, recipient) {
            Ok(notification) => notification,
            Err(error) => {
                error!("Error rendering contact form email: {error}");
                return DeliveryOutcome::Failed(DeliveryFailure::Unavailable(error.to_string()));
            }
        };
        let outcome = mailer.deliver(&notification).await;
        match &outcome {
            DeliveryOutcome::Delivered => {
                info!("Sent contact form email");
                if self.config.auto_reply {
                    self.send_auto_reply(fields, mailer).await;
                }
            }
            DeliveryOutcome::Failed(failure) => {
                error!("Error sending contact form email: {failure}");
            }
        }
        outcome
    }

    async fn send_auto_reply(&self, fields: &CanonicalFields, mailer: &MailerT) {
        let reply = match compose_auto_reply(fields, &self.config.sender) {
            Ok(reply) => reply,
            Err(error) => {
                warn!("Error rendering auto-reply: {error}");
                return;
            }
        };
        if let DeliveryOutcome::Failed(failure) = mailer.deliver(&reply).await {
            warn!("Could not send auto-reply: {failure}");
        }
    }

    fn captcha_configured(&self) -> bool {
        !self.config.captcha.required || self.verifier.is_some()
    }

    fn cors_enabled(&self) -> bool {
        !self.config.allowed_origins.is_empty()
    }

    fn apply_cors(&self, headers: &mut HeaderMap, origin: Option<&str>) {
        let Some(default_origin) = self.config.allowed_origins.first() else {
            return;
        };
        let allowed_origin = origin
            .filter(|origin| self.config.allowed_origins.iter().any(|o| o == origin))
            .unwrap_or(default_origin);
        if let Ok(value) = HeaderValue::from_str(allowed_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
    }
}

fn ping(method: &Method) -> HandlerResponse {
    HandlerResponse {
        status: StatusCode::OK,
        body: json!({
            "ok": true,
            "method": method.as_str(),
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    }
}

fn body_text(body: &Body) -> Cow<'_, str> {
    match body {
        Body::Empty => Cow::Borrowed(""),
        Body::Text(text) => Cow::Borrowed(text.as_str()),
        Body::Binary(bytes) => String::from_utf8_lossy(bytes),
    }
}
