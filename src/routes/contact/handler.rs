use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::error::AppError;
use crate::utils::success_to_api_response;
use crate::AppState;

use super::model::{ContactRequest, ContactSubmission, NewsletterRequest, NewsletterSubscriber};

/// 通知邮件发不出去只记日志,提交本身照常成功
#[axum::debug_handler]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let submission = ContactSubmission::create(&state.pool, &req).await?;

    if let Err(e) = state
        .mailer
        .send(
            &state.config.admin_notify_email,
            &format!("New contact enquiry from {}", submission.name),
            format!(
                "Name: {}\nEmail: {}\nPhone: {}\n\n{}",
                submission.name,
                submission.email,
                submission.phone.as_deref().unwrap_or("-"),
                submission.message
            ),
        )
        .await
    {
        tracing::warn!("contact notification mail failed: {:?}", e);
    }

    Ok((
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({
            "contact_id": submission.contact_id
        })),
    ))
}

#[axum::debug_handler]
pub async fn subscribe_newsletter(
    State(state): State<AppState>,
    Json(req): Json<NewsletterRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    NewsletterSubscriber::subscribe(&state.pool, &req.email).await?;
    Ok(success_to_api_response(serde_json::json!({})))
}
