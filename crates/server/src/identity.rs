//! Caller identity forwarded by the auth gateway.
//!
//! The gateway authenticates the request and sets `x-user-id`,
//! `x-credential-id` and `x-user-role`. Requests reaching a protected route
//! without a complete, well-formed set are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use model::Role;
use service::Caller;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CREDENTIAL_ID_HEADER: &str = "x-credential-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// Extractor for the verified [`Caller`].
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {name} header")))
}

fn uuid_header(parts: &Parts, name: &str) -> Result<Uuid, ApiError> {
    header(parts, name)?
        .parse()
        .map_err(|_| ApiError::unauthorized(format!("malformed {name} header")))
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = uuid_header(parts, USER_ID_HEADER)?;
        let credential_id = uuid_header(parts, CREDENTIAL_ID_HEADER)?;
        let role: Role = header(parts, ROLE_HEADER)?
            .parse()
            .map_err(ApiError::unauthorized)?;
        Ok(Identity(Caller {
            user_id,
            credential_id,
            role,
        }))
    }
}
