//! # Caller Identity
//!
//! Authentication lives in front of this service; the gateway resolves the
//! session and forwards the caller's job number in `x-job-number`. The
//! directory provides everything else (name, organization position).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use cascade_shared::CascadeError;

const JOB_NUMBER_HEADER: &str = "x-job-number";

/// The authenticated caller, identified by HR job number
#[derive(Debug, Clone)]
pub struct Identity {
    pub job_number: String,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(JOB_NUMBER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|job_number| !job_number.is_empty())
            .map(|job_number| Identity {
                job_number: job_number.to_string(),
            })
            .ok_or_else(|| {
                CascadeError::Unauthorized(format!("missing {JOB_NUMBER_HEADER} header"))
                    .into_response()
            })
    }
}
