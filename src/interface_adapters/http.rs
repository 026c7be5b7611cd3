// JSON error bodies for plain HTTP responses: refused upgrades and route failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_keeps_the_status() {
        let response = error_response(StatusCode::SERVICE_UNAVAILABLE, "identity provider unavailable");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
