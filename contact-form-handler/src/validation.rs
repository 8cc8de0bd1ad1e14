use crate::{submission::CanonicalFields, turnstile::TokenVerifier};
use regex::Regex;
use std::sync::OnceLock;
use tracing::error;

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(CanonicalFields),
    Rejected(RejectionReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    MissingFields,
    InvalidEmailFormat,
    HoneypotTriggered,
    CaptchaMissing,
    /// Carries the error codes reported by the verification service.
    CaptchaFailed(Vec<String>),
    CaptchaVerificationError,
    MethodNotAllowed,
    ServerMisconfigured,
}

/// Applies the submission rules in order, stopping at the first one which fails.
///
/// Captcha verification only happens when a `verifier` is given, and only after every local rule
/// has passed.
pub async fn validate(
    fields: CanonicalFields,
    verifier: Option<&dyn TokenVerifier>,
) -> ValidationOutcome {
    if !fields.honeypot.is_empty() {
        return ValidationOutcome::Rejected(RejectionReason::HoneypotTriggered);
    }
    if fields.email.trim().is_empty() || fields.message.trim().is_empty() {
        return ValidationOutcome::Rejected(RejectionReason::MissingFields);
    }
    if !is_plausible_email(fields.email.trim()) {
        return ValidationOutcome::Rejected(RejectionReason::InvalidEmailFormat);
    }
    if let Some(verifier) = verifier {
        if let Err(reason) = check_captcha(&fields.token, verifier).await {
            return ValidationOutcome::Rejected(reason);
        }
    }
    ValidationOutcome::Accepted(fields)
}

async fn check_captcha(token: &str, verifier: &dyn TokenVerifier) -> Result<(), RejectionReason> {
    let token = token.trim();
    if token.is_empty() {
        return Err(RejectionReason::CaptchaMissing);
    }
    match verifier.verify(token).await {
        Ok(verification) if verification.success => Ok(()),
        Ok(verification) => Err(RejectionReason::CaptchaFailed(verification.error_codes)),
        Err(error) => {
            error!("Captcha verification request failed: {error}");
            Err(RejectionReason::CaptchaVerificationError)
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
        })
        .is_match(email)
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::MissingFields => write!(f, "Missing required fields"),
            RejectionReason::InvalidEmailFormat => write!(f, "Invalid email address"),
            RejectionReason::HoneypotTriggered => write!(f, "Honeypot field filled in"),
            RejectionReason::CaptchaMissing => write!(f, "Captcha token missing"),
            RejectionReason::CaptchaFailed(codes) => {
                write!(f, "Captcha verification failed: {codes:?}")
            }
            RejectionReason::CaptchaVerificationError => {
                write!(f, "Captcha verification error")
            }
            RejectionReason::MethodNotAllowed => write!(f, "Method not allowed"),
            RejectionReason::ServerMisconfigured => write!(f, "Server not configured"),
        }
    }
}
