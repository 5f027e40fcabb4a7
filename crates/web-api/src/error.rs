use application::{ApplicationError, StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use ApplicationError as AppErr;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{field}: {reason}"),
            ),
            AppErr::Domain(DomainError::RoomNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND", "room not found")
            }
            AppErr::Domain(DomainError::CallNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "CALL_NOT_FOUND", "call not found")
            }
            AppErr::Domain(DomainError::CallEnded) => {
                ApiError::new(StatusCode::GONE, "CALL_ENDED", "This call has ended")
            }
            AppErr::Domain(DomainError::CallFull) => {
                ApiError::new(StatusCode::CONFLICT, "CALL_FULL", "call is full")
            }
            // 原样透出，例如 "Only the host can end the call"
            AppErr::Domain(DomainError::PermissionDenied { action }) => {
                ApiError::new(StatusCode::FORBIDDEN, "PERMISSION_DENIED", action)
            }
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message } => {
                    tracing::error!(error = %message, "数据库错误");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "database error",
                    )
                }
            },
            AppErr::Storage(err) => match err {
                StorageError::TooLarge { .. } => ApiError::new(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "FILE_TOO_LARGE",
                    err.to_string(),
                ),
                StorageError::ExtensionNotAllowed(_) | StorageError::Empty => {
                    ApiError::new(StatusCode::BAD_REQUEST, "INVALID_FILE", err.to_string())
                }
                StorageError::Backend(message) => {
                    tracing::error!(error = %message, "附件存储失败");
                    ApiError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "file storage failed",
                    )
                }
            },
            AppErr::Protocol(err) => {
                ApiError::new(StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", err.to_string())
            }
            AppErr::Authentication => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "authentication required",
            ),
            AppErr::Observer { observer, message } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "OBSERVER_ERROR",
                format!("{observer}: {message}"),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}
