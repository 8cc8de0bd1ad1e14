use crate::bind_ephemeral;
use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

const VERIFY_PATH: &str = "/turnstile/v0/siteverify";

#[derive(Clone)]
pub struct FakeTurnstile {
    required_secret: Cow<'static, str>,
    required_token: Option<String>,
    return_invalid_response: bool,
    request_count: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct VerifyRequestPayload {
    secret: String,
    response: String,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

impl FakeTurnstile {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            return_invalid_response: false,
            request_count: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl AsRef<str>) -> Self {
        Self {
            required_token: Some(required_token.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    /// Starts serving in the background and returns the verification URL.
    pub async fn serve(&self) -> String {
        let (listener, address) = bind_ephemeral().await;
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{address}{VERIFY_PATH}")
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

async fn verify(
    State(state): State<FakeTurnstile>,
    Form(payload): Form<VerifyRequestPayload>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);
    if state.return_invalid_response {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response();
    }
    let error_codes = if payload.secret != state.required_secret {
        vec!["invalid-input-secret".to_string()]
    } else if state
        .required_token
        .as_ref()
        .is_some_and(|token| *token != payload.response)
    {
        vec!["invalid-input-response".to_string()]
    } else {
        vec![]
    };
    Json(VerifyResponsePayload {
        success: error_codes.is_empty(),
        error_codes,
    })
    .into_response()
}
