//! Domain errors rendered as JSON HTTP responses.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use emberchat_core::Error;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wrapper so handlers can `?` domain errors.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self(Error::Unauthenticated(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Store(_) | Error::Config { .. } | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            Error::Unauthenticated(m)
            | Error::Forbidden(m)
            | Error::NotFound(m)
            | Error::Validation(m)
            | Error::Conflict(m) => m.clone(),
            Error::Provider(_) => "Upstream model provider failed".into(),
            Error::Store(_) | Error::Config { .. } | Error::Internal(_) => {
                "Internal server error".into()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.public_message(),
        });
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberchat_core::StoreError;

    #[test]
    fn status_table() {
        let cases = [
            (Error::Unauthenticated("x".into()), 401),
            (Error::Forbidden("x".into()), 403),
            (Error::NotFound("x".into()), 404),
            (Error::Validation("x".into()), 422),
            (Error::Conflict("x".into()), 409),
            (Error::Store(StoreError::Storage("disk".into())), 500),
            (Error::Internal("x".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError(err).status().as_u16(), code);
        }
    }

    #[test]
    fn storage_detail_is_not_exposed() {
        let err = ApiError(Error::Store(StoreError::QueryFailed(
            "no such table: messages".into(),
        )));
        assert_eq!(err.public_message(), "Internal server error");
    }
}
