use crate::{
    delivery::{DeliveryFailure, DeliveryOutcome},
    validation::{RejectionReason, ValidationOutcome},
};
use lambda_http::{
    http::{header, HeaderValue, StatusCode},
    Body, Error, Response,
};
use serde::Serialize;
use serde_json::Value;

const MAIL_SEND_FAILED: &str = "Mail send failed";

/// Transport-independent result of handling one request.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Serialize, Default)]
struct ResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ResponseBody {
    fn ok() -> Self {
        Self {
            ok: Some(true),
            ..Default::default()
        }
    }

    fn error(error: &'static str) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    fn mail_send_failed(detail: Option<String>) -> Self {
        Self {
            ok: Some(false),
            error: Some(MAIL_SEND_FAILED),
            detail,
            ..Default::default()
        }
    }
}

impl HandlerResponse {
    fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            status,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    /// Converts into a Lambda HTTP response. Responses are never cached.
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let body = serde_json::to_string(&self.body)?;
        Ok(Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .body(body.into())
            .map_err(Box::new)?)
    }
}

/// Maps the outcome of validation and, for accepted submissions, delivery to a response.
pub fn map_outcome(
    outcome: &ValidationOutcome,
    delivery: Option<&DeliveryOutcome>,
) -> HandlerResponse {
    match outcome {
        ValidationOutcome::Rejected(reason) => map_rejection(reason),
        ValidationOutcome::Accepted(_) => match delivery {
            Some(DeliveryOutcome::Delivered) => {
                HandlerResponse::new(StatusCode::OK, ResponseBody::ok())
            }
            Some(DeliveryOutcome::Failed(DeliveryFailure::Rejected { detail })) => {
                HandlerResponse::new(
                    StatusCode::BAD_GATEWAY,
                    ResponseBody::mail_send_failed(Some(detail.clone())),
                )
            }
            Some(DeliveryOutcome::Failed(DeliveryFailure::Unavailable(_))) | None => {
                HandlerResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ResponseBody::mail_send_failed(None),
                )
            }
        },
    }
}

pub fn map_rejection(reason: &RejectionReason) -> HandlerResponse {
    match reason {
        RejectionReason::MethodNotAllowed => HandlerResponse::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ResponseBody::error("Method not allowed"),
        ),
        // Automated submitters must not learn that the trap caught them, so this looks exactly
        // like a successful delivery.
        RejectionReason::HoneypotTriggered => {
            HandlerResponse::new(StatusCode::OK, ResponseBody::ok())
        }
        RejectionReason::MissingFields => HandlerResponse::new(
            StatusCode::BAD_REQUEST,
            ResponseBody::error("Missing required fields"),
        ),
        RejectionReason::InvalidEmailFormat => HandlerResponse::new(
            StatusCode::BAD_REQUEST,
            ResponseBody::error("Invalid email"),
        ),
        RejectionReason::CaptchaMissing => HandlerResponse::new(
            StatusCode::BAD_REQUEST,
            ResponseBody::error("Captcha token missing"),
        ),
        RejectionReason::CaptchaFailed(error_codes) => HandlerResponse::new(
            StatusCode::BAD_REQUEST,
            ResponseBody {
                details: Some(error_codes.clone()),
                ..ResponseBody::error("Captcha verification failed")
            },
        ),
        RejectionReason::CaptchaVerificationError => HandlerResponse::new(
            StatusCode::BAD_GATEWAY,
            ResponseBody::error("Captcha verification error"),
        ),
        RejectionReason::ServerMisconfigured => HandlerResponse::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseBody::error("Server not configured"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{map_outcome, map_rejection, HandlerResponse};
    use crate::{
        delivery::{DeliveryFailure, DeliveryOutcome},
        submission::CanonicalFields,
        validation::{RejectionReason, ValidationOutcome},
    };
    use googletest::prelude::*;
    use lambda_http::{http::StatusCode, Body};
    use serde_json::json;

    fn accepted() -> ValidationOutcome {
        ValidationOutcome::Accepted(CanonicalFields::default())
    }

    #[test]
    fn maps_each_rejection_to_status_and_body() -> Result<()> {
        let table = [
            (
                RejectionReason::MethodNotAllowed,
                405,
                json!({"error": "Method not allowed"}),
            ),
            (RejectionReason::HoneypotTriggered, 200, json!({"ok": true})),
            (
                RejectionReason::MissingFields,
                400,
                json!({"error": "Missing required fields"}),
            ),
            (
                RejectionReason::InvalidEmailFormat,
                400,
                json!({"error": "Invalid email"}),
            ),
            (
                RejectionReason::CaptchaMissing,
                400,
                json!({"error": "Captcha token missing"}),
            ),
            (
                RejectionReason::CaptchaVerificationError,
                502,
                json!({"error": "Captcha verification error"}),
            ),
            (
                RejectionReason::ServerMisconfigured,
                500,
                json!({"error": "Server not configured"}),
            ),
        ];

        for (reason, status, body) in table {
            verify_that!(
                map_rejection(&reason),
                matches_pattern!(HandlerResponse {
                    status: eq(StatusCode::from_u16(status).unwrap()),
                    body: eq(body),
                })
            )?;
        }
        Ok(())
    }

    #[test]
    fn echoes_provider_error_codes_when_captcha_fails() -> Result<()> {
        let reason = RejectionReason::CaptchaFailed(vec!["timeout-or-duplicate".into()]);

        verify_that!(
            map_outcome(&ValidationOutcome::Rejected(reason), None),
            eq(HandlerResponse {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "Captcha verification failed",
                    "details": ["timeout-or-duplicate"]
                }),
            })
        )
    }

    #[test]
    fn reports_success_after_delivery() -> Result<()> {
        verify_that!(
            map_outcome(&accepted(), Some(&DeliveryOutcome::Delivered)),
            eq(HandlerResponse {
                status: StatusCode::OK,
                body: json!({"ok": true}),
            })
        )
    }

    #[test]
    fn hides_detail_of_unavailable_delivery() -> Result<()> {
        let delivery =
            DeliveryOutcome::Failed(DeliveryFailure::Unavailable("connection refused".into()));

        verify_that!(
            map_outcome(&accepted(), Some(&delivery)),
            eq(HandlerResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({"ok": false, "error": "Mail send failed"}),
            })
        )
    }

    #[test]
    fn passes_on_detail_of_refused_delivery() -> Result<()> {
        let delivery = DeliveryOutcome::Failed(DeliveryFailure::Rejected {
            detail: "domain not verified".into(),
        });

        verify_that!(
            map_outcome(&accepted(), Some(&delivery)),
            eq(HandlerResponse {
                status: StatusCode::BAD_GATEWAY,
                body: json!({
                    "ok": false,
                    "error": "Mail send failed",
                    "detail": "domain not verified"
                }),
            })
        )
    }

    #[test]
    fn treats_accepted_submission_without_delivery_as_failure() -> Result<()> {
        verify_that!(
            map_outcome(&accepted(), None).status,
            eq(StatusCode::INTERNAL_SERVER_ERROR)
        )
    }

    #[test]
    fn sets_json_and_no_store_headers() -> Result<()> {
        let response = map_rejection(&RejectionReason::MissingFields)
            .into_response()
            .unwrap();

        verify_that!(response.status().as_u16(), eq(400))?;
        verify_that!(
            response.headers().get("Cache-Control"),
            some(eq("no-store"))
        )?;
        verify_that!(
            response.headers().get("Content-Type"),
            some(eq("application/json"))
        )?;
        verify_that!(
            response.body(),
            points_to(matches_pattern!(Body::Text(eq(
                r#"{"error":"Missing required fields"}"#
            ))))
        )
    }
}
