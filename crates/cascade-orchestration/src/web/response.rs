//! # Response Envelope
//!
//! Every endpoint answers `{code, msg, data}`: code 200 on success, 400 for
//! payload schema violations (with structured errors in `data.errors`), and
//! 500 for semantic, state and infrastructure errors. Semantic errors carry
//! a message naming the offending entity; infrastructure details stay in the
//! logs.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_empty() -> Self {
        Self {
            code: 200,
            msg: "ok".to_string(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// `Json<T>` wrapper that turns deserialization rejections into the
/// envelope's structured 400 shape instead of axum's plain-text default
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(payload_rejection(rejection)),
        }
    }
}

fn payload_rejection(rejection: JsonRejection) -> Response {
    let message = rejection.body_text();
    let body = Json(json!({
        "code": 400,
        "msg": "payload validation failed",
        "data": {
            "errors": [{
                "field": "body",
                "type": "schema",
                "message": message,
                "input": serde_json::Value::Null,
            }]
        }
    }));
    (StatusCode::BAD_REQUEST, body).into_response()
}
