use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use common::MirrorError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `MALFORMED_CREDENTIALS`, `CREDENTIALS_MISSING`, `INVALID_CREDENTIALS`,
    /// `PERMISSION_DENIED`, `NOT_FOUND`, `NOT_ACCEPTABLE`, `MIRROR_UNAVAILABLE`,
    /// `PROCESSING_FAILED`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Provide a file upload or ?img=<key>")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    /// Authorization header present but not decodable.
    MalformedCredentials,
    CredentialsMissing,
    InvalidCredentials,
    PermissionDenied,
    NotFound(String),
    NotAcceptable,
    /// Remote mirror missing from the configuration or unreachable.
    MirrorUnavailable(String),
    /// The detector or annotation renderer failed on the input image.
    Processing(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::MalformedCredentials => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "MALFORMED_CREDENTIALS",
                    message: "Authorization header could not be decoded".into(),
                },
            ),
            AppError::CredentialsMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "CREDENTIALS_MISSING",
                    message: "Not authenticated".into(),
                },
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "INVALID_CREDENTIALS",
                    message: "Invalid username or password".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Not authorized to access this resource".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::NotAcceptable => (
                StatusCode::NOT_ACCEPTABLE,
                ErrorBody {
                    code: "NOT_ACCEPTABLE",
                    message: "Client does not accept an image format".into(),
                },
            ),
            AppError::MirrorUnavailable(detail) => {
                tracing::error!("Mirror unavailable: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "MIRROR_UNAVAILABLE",
                        message: detail,
                    },
                )
            }
            AppError::Processing(detail) => {
                tracing::error!("Processing failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "PROCESSING_FAILED",
                        message: "The image could not be processed".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        if status == StatusCode::UNAUTHORIZED {
            (
                status,
                [(header::WWW_AUTHENTICATE, r#"Basic realm="vision""#)],
                Json(body),
            )
                .into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<MirrorError> for AppError {
    fn from(err: MirrorError) -> Self {
        match err {
            MirrorError::NotFound(key) => {
                tracing::warn!("Remote object not found: {key}");
                AppError::NotFound(format!("Object '{key}' not found"))
            }
            MirrorError::InvalidKey(detail) => AppError::Validation(detail),
            MirrorError::Config(detail) | MirrorError::Remote(detail) => {
                AppError::MirrorUnavailable(detail)
            }
            MirrorError::Io(e) => AppError::Internal(e.to_string()),
        }
    }
}
