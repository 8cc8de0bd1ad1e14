use crate::{
    delivery::{is_encrypted_url, SmtpCredentials, RESEND_API_URL},
    secrets::SecretRepository,
    submission::FieldAliases,
    turnstile::TURNSTILE_VERIFY_URL,
};
use anyhow::Context;
use std::collections::HashMap;
use tracing::{error, info};

/// Names a Secrets Manager secret whose JSON object overrides environment variables.
pub const SECRETS_ID_VARIABLE: &str = "CONTACT_SECRETS_ID";
pub const DEFAULT_FROM_ADDRESS: &str = "Web contact form <no-reply@example.com>";

/// Deployment settings, resolved once per cold start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub recipient: Option<String>,
    pub sender: String,
    pub delivery: Option<DeliveryConfig>,
    pub captcha: CaptchaConfig,
    pub aliases: FieldAliases,
    pub allowed_origins: Vec<String>,
    pub auto_reply: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryConfig {
    Resend {
        api_key: String,
        api_url: String,
    },
    Smtp {
        url: String,
        credentials: Option<SmtpCredentials>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptchaConfig {
    pub secret: Option<String>,
    pub required: bool,
    pub verify_url: String,
}

impl Config {
    /// Reads the environment, overlaid with the secret named by [`SECRETS_ID_VARIABLE`] if set.
    ///
    /// A secret which cannot be fetched is logged and ignored; the resulting configuration is
    /// then usually incomplete and requests are answered as misconfigured.
    pub async fn load<SecretRepositoryT: SecretRepository>() -> Self {
        let overlay = match std::env::var(SECRETS_ID_VARIABLE) {
            Ok(secret_id) => match Self::fetch_overlay::<SecretRepositoryT>(&secret_id).await {
                Ok(overlay) => {
                    info!("Loaded {} settings from secret {secret_id}", overlay.len());
                    overlay
                }
                Err(error) => {
                    error!("{error:#}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self::from_lookup(|key| {
            overlay
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    async fn fetch_overlay<SecretRepositoryT: SecretRepository>(
        secret_id: &str,
    ) -> anyhow::Result<HashMap<String, String>> {
        SecretRepositoryT::open()
            .await
            .get_secret(secret_id)
            .await
            .context("Could not load settings from secrets manager")
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = FieldAliases::default();

        let delivery = if let Some(api_key) = value("RESEND_API_KEY") {
            Some(DeliveryConfig::Resend {
                api_key,
                api_url: value("RESEND_API_URL").unwrap_or_else(|| RESEND_API_URL.into()),
            })
        } else {
            value("SMTP_URL").map(|url| DeliveryConfig::Smtp {
                url,
                credentials: value("SMTP_USERNAME")
                    .zip(value("SMTP_PASSWORD"))
                    .map(|(username, password)| SmtpCredentials { username, password }),
            })
        };

        Self {
            recipient: value("CONTACT_TO"),
            sender: value("CONTACT_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.into()),
            delivery,
            captcha: CaptchaConfig {
                secret: value("TURNSTILE_SECRET"),
                required: is_truthy(value("TURNSTILE_REQUIRED")),
                verify_url: value("TURNSTILE_VERIFY_URL")
                    .unwrap_or_else(|| TURNSTILE_VERIFY_URL.into()),
            },
            aliases: FieldAliases {
                honeypot: value("CONTACT_HONEYPOT_FIELDS")
                    .map(split_list)
                    .unwrap_or(defaults.honeypot),
                token: value("CONTACT_TOKEN_FIELDS")
                    .map(split_list)
                    .unwrap_or(defaults.token),
            },
            allowed_origins: value("CONTACT_ALLOWED_ORIGINS")
                .map(split_list)
                .unwrap_or_default(),
            auto_reply: is_truthy(value("CONTACT_AUTO_REPLY")),
        }
    }

    /// Names the settings whose absence keeps the handler from accepting submissions.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.recipient.is_none() {
            missing.push("CONTACT_TO");
        }
        if self.delivery.is_none() {
            missing.push("RESEND_API_KEY or SMTP_URL");
        }
        if self.sends_smtp_credentials_unencrypted() {
            missing.push("SMTP_URL with smtps:// or tls=required for SMTP credentials");
        }
        if self.captcha.required && self.captcha.secret.is_none() {
            missing.push("TURNSTILE_SECRET");
        }
        missing
    }

    /// Whether SMTP credentials are configured for a relay URL which does not enforce TLS.
    pub fn sends_smtp_credentials_unencrypted(&self) -> bool {
        matches!(
            &self.delivery,
            Some(DeliveryConfig::Smtp {
                url,
                credentials: Some(_),
            }) if !is_encrypted_url(url)
        )
    }
}

fn split_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn is_truthy(value: Option<String>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
