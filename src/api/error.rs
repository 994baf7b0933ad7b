use crate::{app::AppError, model::FieldError, parser::ParseErrorDetail, schema::SchemaError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors returned by HTTP handlers. Every variant renders as
/// `{"message": "..."}` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    App(AppError),

    BadRequest(String),

    UnsupportedMediaType(String),
}

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        ApiError::App(value)
    }
}

impl From<SchemaError> for ApiError {
    fn from(value: SchemaError) -> Self {
        ApiError::App(value.into())
    }
}

impl From<FieldError> for ApiError {
    fn from(value: FieldError) -> Self {
        ApiError::App(value.into())
    }
}

impl From<ParseErrorDetail> for ApiError {
    fn from(value: ParseErrorDetail) -> Self {
        ApiError::App(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message) = match self {
            ApiError::App(app_error) => match app_error {
                AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                e @ AppError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
                AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                e @ (AppError::Database(_) | AppError::Storage(_) | AppError::Schema(_)) => {
                    tracing::error!(error = %e, "request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    )
                }
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use crate::app::AppError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::Validation(vec!["x".into()]), StatusCode::BAD_REQUEST),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
        ];

        for (error, status) in cases {
            assert_eq!(status, ApiError::from(error).into_response().status());
        }

        assert_eq!(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::UnsupportedMediaType("x".into())
                .into_response()
                .status()
        );
    }
}
