use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Answer of a captcha verification service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenVerification {
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<TokenVerification, VerificationError>;
}

/// Verifies Cloudflare Turnstile tokens with the `siteverify` endpoint.
pub struct TurnstileVerifier {
    client: Client,
    secret: String,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(secret: impl Into<String>, verify_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret: secret.into(),
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str) -> Result<TokenVerification, VerificationError> {
        let response = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|error| VerificationError::Transport(error.to_string()))?;
        let status = response.status();
        response
            .json::<TokenVerification>()
            .await
            .map_err(|error| VerificationError::InvalidResponse(format!("{status}: {error}")))
    }
}

#[derive(Debug)]
pub enum VerificationError {
    Transport(String),
    InvalidResponse(String),
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationError::Transport(error) => write!(f, "Transport error: {error}"),
            VerificationError::InvalidResponse(error) => {
                write!(f, "Invalid response from verification service: {error}")
            }
        }
    }
}

impl std::error::Error for VerificationError {}
