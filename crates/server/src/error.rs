use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use service::ServiceError;
use tracing::{debug, error};

/// Error returned by every handler: a [`ServiceError`] rendered as
/// `{ "error": message }` with the matching status code.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(ServiceError::Unauthorized(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidState(_) | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Db(_) | ServiceError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            // Storage details stay in the log.
            error!(error = %self.0, "Request failed");
            "internal server error".to_string()
        } else {
            debug!(error = %self.0, status = status.as_u16(), "Request rejected");
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::NotFound("order 1".into()), StatusCode::NOT_FOUND),
            (ServiceError::InvalidState("no".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Validation("qty".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Conflict("dup".into()), StatusCode::CONFLICT),
            (ServiceError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                ServiceError::InsufficientStock {
                    product: "Pan".into(),
                    available: 1,
                    requested: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ServiceError::Unauthorized("who".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Unexpected("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
