use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Status code {0}")]
    Status(StatusCode),
    #[error("{1}")]
    Text(StatusCode, String),
    #[error("DB error {0}")]
    DBError(#[from] sqlx::Error),
    #[error("Migration error {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("Serde error {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("S3 error {0}")]
    S3Error(#[from] s3::error::S3Error),
    #[error("Credentials error {0}")]
    CredentialsError(#[from] s3::creds::error::CredentialsError),
    #[error("Multipart error {0}")]
    MultipartError(#[from] MultipartError),
    #[error("Upstream error {0}")]
    UpstreamError(#[from] reqwest::Error),
    #[error("Token error {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),
    #[error("Hash error {0}")]
    HashError(#[from] bcrypt::BcryptError),
    #[error("Background task failed {0}")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("{}", .0.body_text())]
    JsonRejection(#[from] JsonRejection),
    #[error("{}", .0.body_text())]
    FormRejection(#[from] FormRejection),
    #[error("{}", .0.body_text())]
    QueryRejection(#[from] QueryRejection),
    #[error("{}", .0.body_text())]
    PathRejection(#[from] PathRejection),
    #[error("{}", .0.body_text())]
    MultipartRejection(#[from] MultipartRejection),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Status(code) | AppError::Text(code, _) => *code,
            AppError::SerdeError(_) | AppError::MultipartError(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            AppError::TokenError(_) => StatusCode::UNAUTHORIZED,
            AppError::JsonRejection(rejection) => rejection.status(),
            AppError::FormRejection(rejection) => rejection.status(),
            AppError::QueryRejection(rejection) => rejection.status(),
            AppError::PathRejection(rejection) => rejection.status(),
            AppError::MultipartRejection(rejection) => rejection.status(),
            AppError::DBError(_)
            | AppError::JoinError(_)
            | AppError::MigrateError(_)
            | AppError::S3Error(_)
            | AppError::CredentialsError(_)
            | AppError::HashError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::Status(code) => code
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
            AppError::TokenError(_) => "Invalid or expired token".to_string(),
            AppError::HashError(_) | AppError::JoinError(_) => {
                "Failed to process credentials".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(message = "app error", error = %self);
        } else {
            tracing::warn!(message = "request rejected", status = %status, error = %self);
        }

        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
