//! Acting user extraction
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user id in `X-User-Id`.

use axum::{
    http::{request::Parts, StatusCode},
    Json,
};

use crate::error::{ErrorDetail, ErrorResponse};

pub const ACTOR_HEADER: &str = "x-user-id";

/// Id of the user performing the request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentActor(pub i64);

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            field: Some(ACTOR_HEADER.to_string()),
        },
    };
    (StatusCode::UNAUTHORIZED, Json(error))
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| unauthorized("Acting user is required"))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(CurrentActor)
            .ok_or_else(|| unauthorized("Acting user id is malformed"))
    }
}
