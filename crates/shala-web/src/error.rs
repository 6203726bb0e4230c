use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use shala_core::error::ShalaError;

/// JSON API error type for REST endpoints.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<ShalaError> for ApiError {
    fn from(err: ShalaError) -> Self {
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            ShalaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ShalaError::ClassFull(_) | ShalaError::ClassNotEmpty(_) => StatusCode::CONFLICT,
            e if e.is_retriable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                tracing::error!("api error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::now_v7();
        let cases = [
            (ShalaError::ClassNotFound(id), StatusCode::NOT_FOUND),
            (ShalaError::SessionNotFound(id), StatusCode::NOT_FOUND),
            (
                ShalaError::RegistrationNotFound {
                    class_id: id,
                    student_id: "s".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (ShalaError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (ShalaError::ClassFull(id), StatusCode::CONFLICT),
            (ShalaError::ClassNotEmpty(id), StatusCode::CONFLICT),
            (
                ShalaError::ConcurrencyExhausted {
                    class_id: id,
                    attempts: 10,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ShalaError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }
}
