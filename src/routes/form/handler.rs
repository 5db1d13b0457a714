use std::collections::HashMap;

use axum::{
    extract::{Extension, Json, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::routes::user::model::User;
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

use super::flow::{FieldKind, find_form, validate_all, validate_step};
use super::model::FormSubmission;

#[axum::debug_handler]
pub async fn get_form(Path(form_id): Path<String>) -> Result<impl IntoResponse, AppError> {
    let def = find_form(&form_id).ok_or_else(|| AppError::NotFound("form".into()))?;
    Ok(success_to_api_response(def))
}

#[axum::debug_handler]
pub async fn list_forms() -> impl IntoResponse {
    success_to_api_response(super::flow::all_forms())
}

#[derive(Debug, Deserialize)]
pub struct ValidateStepRequest {
    pub step: usize,
    #[serde(default)]
    pub values: HashMap<String, String>,
}

/// 与前端本地状态机保持同一套校验:只看当前步骤的字段
#[axum::debug_handler]
pub async fn validate_form_step(
    Path(form_id): Path<String>,
    Json(req): Json<ValidateStepRequest>,
) -> Result<impl IntoResponse, AppError> {
    let def = find_form(&form_id).ok_or_else(|| AppError::NotFound("form".into()))?;
    if req.step >= def.steps.len() {
        return Err(AppError::field("step", "step out of range"));
    }

    let errors = validate_step(def, req.step, &req.values);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let next_step = (req.step + 1).min(def.steps.len() - 1);
    Ok(success_to_api_response(serde_json::json!({
        "next_step": next_step,
        "last": req.step + 1 >= def.steps.len(),
    })))
}

/// 终提:全量校验所有步骤,文件直传对象存储,文档进集合。
/// 入库成功后扣减一条待办服务,扣减失败不影响提交本身。
#[axum::debug_handler]
pub async fn submit_form(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let def = find_form(&form_id).ok_or_else(|| AppError::NotFound("form".into()))?;

    let file_rules: Vec<&str> = def
        .steps
        .iter()
        .flat_map(|s| s.fields)
        .filter(|r| matches!(r.kind, FieldKind::File))
        .map(|r| r.name)
        .collect();

    let mut values: HashMap<String, String> = HashMap::new();
    let mut file_urls: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if file_rules.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or("attachment").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?;

            if bytes.len() as u64 > state.config.upload_max_bytes {
                return Err(AppError::field(&name, "file exceeds the upload size limit"));
            }

            let key = format!(
                "filings/{}/{}/{}-{}",
                def.form_id,
                claims.sub,
                uuid::Uuid::new_v4().simple(),
                file_name
            );
            let url = state
                .storage
                .put_object(&key, &content_type, bytes.to_vec())
                .await?;
            file_urls.insert(name, url);
        } else {
            values.insert(name, field.text().await?);
        }
    }

    // 文件字段用已上传的地址占位,让必填校验一并覆盖
    let mut merged = values.clone();
    for (name, url) in &file_urls {
        merged.insert(name.clone(), url.clone());
    }

    let errors = validate_all(def, &merged);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let document =
        FormSubmission::build_document(def, &values, &file_urls, &claims.sub, &claims.email);
    let submission_id = FormSubmission::insert(&state.mongo, def.collection, document).await?;
    tracing::info!(
        "form {} submitted by {} into {}",
        def.form_id,
        claims.sub,
        def.collection
    );

    let warning = match User::consume_pf_item(&state.pool, &claims.sub, def.form_id).await {
        Ok(true) => None,
        Ok(false) => {
            tracing::warn!(
                "no pending service entry {} for user {}",
                def.form_id,
                claims.sub
            );
            Some("submission saved, but no matching purchased service was found".to_string())
        }
        Err(e) => {
            tracing::warn!("pending-service cleanup failed: {:?}", e);
            Some("submission saved, but your purchased services could not be updated".to_string())
        }
    };

    Ok((
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({
            "submission_id": submission_id,
            "collection": def.collection,
            "warning": warning,
        })),
    ))
}
