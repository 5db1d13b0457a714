use std::collections::BTreeMap;

use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{ApiResponse, error_codes};

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    Validation(BTreeMap<String, String>),
    BadRequest(String),
    Upstream(String),
}

impl AppError {
    pub fn upstream(context: &str, detail: impl std::fmt::Display) -> Self {
        AppError::Upstream(format!("{}: {}", context, detail))
    }

    pub fn field(name: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.to_string(), message.to_string());
        AppError::Validation(fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg, data) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "unauthorized".to_string(),
                None,
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                "permission denied".to_string(),
                None,
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                format!("{} not found", what),
                None,
            ),
            AppError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                "validation failed".to_string(),
                Some(serde_json::json!(fields)),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                msg,
                None,
            ),
            AppError::Upstream(detail) => {
                // 详细原因只进日志，客户端只看到笼统信息
                tracing::error!("upstream failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ApiResponse::<serde_json::Value> {
            code,
            msg,
            resp_data: data,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record".into()),
            other => AppError::upstream("database", other),
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::upstream("document store", e)
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::upstream("redis", e)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::upstream("bcrypt", e)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthorized
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("malformed multipart body: {}", e))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = BTreeMap::new();
        for (field, errs) in errors.field_errors() {
            let msg = errs
                .first()
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid value".to_string());
            fields.insert(field.to_string(), msg);
        }
        AppError::Validation(fields)
    }
}

impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for AppError
where
    E: std::fmt::Debug,
    R: std::fmt::Debug,
{
    fn from(e: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        AppError::Upstream(format!("object storage: {:?}", e))
    }
}

impl From<aws_sdk_s3::presigning::PresigningConfigError> for AppError {
    fn from(e: aws_sdk_s3::presigning::PresigningConfigError) -> Self {
        AppError::upstream("presigning config", e)
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        AppError::upstream("smtp", e)
    }
}
