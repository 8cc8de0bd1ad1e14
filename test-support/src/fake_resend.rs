use crate::bind_ephemeral;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};

const EMAILS_PATH: &str = "/emails";

/// Stand-in for the Resend transactional email API.
#[derive(Clone)]
pub struct FakeResend {
    required_api_key: Cow<'static, str>,
    failure: Option<(StatusCode, String)>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeResend {
    pub fn new(required_api_key: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_api_key: required_api_key.into(),
            failure: None,
            received: Default::default(),
        }
    }

    pub fn fail_with(self, status: u16, body: impl Into<String>) -> Self {
        Self {
            failure: Some((
                StatusCode::from_u16(status).unwrap(),
                body.into(),
            )),
            ..self
        }
    }

    /// Starts serving in the background and returns the API base URL.
    pub async fn serve(&self) -> String {
        let (listener, address) = bind_ephemeral().await;
        let app = Router::new()
            .route(EMAILS_PATH, post(send_email))
            .with_state(self.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{address}")
    }

    pub fn received_messages(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

async fn send_email(
    State(state): State<FakeResend>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let expected_authorization = format!("Bearer {}", state.required_api_key);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == expected_authorization.as_bytes());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "name": "validation_error", "message": "API key is invalid" })),
        )
            .into_response();
    }
    if let Some((status, body)) = state.failure.clone() {
        return (status, body).into_response();
    }
    state.received.lock().unwrap().push(payload);
    Json(json!({ "id": "49a3999c-0ce1-4ea6-ab68-afcd6dc2e794" })).into_response()
}
