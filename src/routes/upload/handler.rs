use axum::{
    extract::{Extension, Json, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::routes::form::model::UploadRecord;
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignUploadRequest {
    #[validate(length(min = 1, max = 200, message = "file_name must be 1 to 200 characters"))]
    pub file_name: String,
    #[validate(length(min = 3, max = 100, message = "content_type must be 3 to 100 characters"))]
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct SignDownloadQuery {
    pub key: String,
}

pub fn check_upload_size(size: u64, limit: u64) -> Result<(), AppError> {
    if size > limit {
        return Err(AppError::field("size", "file exceeds the upload size limit"));
    }
    Ok(())
}

// 对象键里只保留文件名本体,斜杠等一律替换掉
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 超限在签名之前就拒绝,存储和文档库都不会被碰到
#[axum::debug_handler]
pub async fn sign_upload(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<SignUploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    check_upload_size(req.size, state.config.upload_max_bytes)?;

    let key = format!(
        "uploads/{}/{}-{}",
        claims.sub,
        uuid::Uuid::new_v4().simple(),
        sanitize_file_name(&req.file_name)
    );

    // 签名失败直接失败返回,不会留下半截记录
    let upload_url = state.storage.presign_put(&key, &req.content_type).await?;
    let object_url = state.storage.object_url(&key);

    UploadRecord::record(
        &state.mongo,
        &key,
        &object_url,
        &req.content_type,
        req.size,
        &claims.sub,
    )
    .await?;

    Ok(success_to_api_response(serde_json::json!({
        "key": key,
        "upload_url": upload_url,
        "object_url": object_url,
        "expires_in": state.config.presign_expire_secs,
    })))
}

#[axum::debug_handler]
pub async fn sign_download(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(query): Query<SignDownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !claims.is_admin() && !UploadRecord::owns_key(&state.mongo, &query.key, &claims.sub).await? {
        return Err(AppError::Forbidden);
    }

    let download_url = state.storage.presign_get(&query.key).await?;
    Ok(success_to_api_response(serde_json::json!({
        "download_url": download_url,
        "expires_in": state.config.presign_expire_secs,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_request_is_rejected_before_any_side_effect() {
        let err = check_upload_size(11 * 1024 * 1024, 10 * 1024 * 1024).unwrap_err();
        match err {
            AppError::Validation(fields) => assert!(fields.contains_key("size")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(check_upload_size(1024, 10 * 1024 * 1024).is_ok());
    }

    #[test]
    fn file_names_cannot_escape_the_prefix() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("form 16.pdf"), "form_16.pdf");
    }
}
