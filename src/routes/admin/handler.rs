use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::routes::bot::model::{BotResponse, UpsertBotResponseRequest};
use crate::routes::contact::model::{ContactSubmission, NewsletterSubscriber};
use crate::routes::form::flow::all_forms;
use crate::routes::form::model::FormSubmission;
use crate::routes::ticket::model::{Ticket, TicketStatus};
use crate::utils::success_to_api_response;
use crate::AppState;

const LIST_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
}

#[axum::debug_handler]
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(filter): Query<TicketFilter>,
) -> Result<impl IntoResponse, AppError> {
    let status = match filter.status.as_deref() {
        Some(raw) => Some(
            TicketStatus::parse(raw)
                .ok_or_else(|| AppError::field("status", "unknown status"))?,
        ),
        None => None,
    };

    let tickets = Ticket::list_all(&state.pool, status).await?;
    Ok(success_to_api_response(tickets))
}

#[axum::debug_handler]
pub async fn list_bot_responses(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let responses = BotResponse::list_all(&state.pool).await?;
    Ok(success_to_api_response(responses))
}

#[axum::debug_handler]
pub async fn create_bot_response(
    State(state): State<AppState>,
    Json(req): Json<UpsertBotResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let response = BotResponse::create(&state.pool, &req).await?;
    BotResponse::invalidate_cache(&state.redis).await;
    Ok((StatusCode::CREATED, success_to_api_response(response)))
}

#[axum::debug_handler]
pub async fn update_bot_response(
    State(state): State<AppState>,
    Path(response_id): Path<String>,
    Json(req): Json<UpsertBotResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let response = BotResponse::update(&state.pool, &response_id, &req).await?;
    BotResponse::invalidate_cache(&state.redis).await;
    Ok(success_to_api_response(response))
}

#[axum::debug_handler]
pub async fn delete_bot_response(
    State(state): State<AppState>,
    Path(response_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    BotResponse::delete(&state.pool, &response_id).await?;
    BotResponse::invalidate_cache(&state.redis).await;
    Ok(success_to_api_response(serde_json::json!({})))
}

// 集合名必须来自表单注册表,不给任意集合开口子
fn known_collection(collection: &str) -> Result<&'static str, AppError> {
    all_forms()
        .iter()
        .map(|f| f.collection)
        .find(|c| *c == collection)
        .ok_or_else(|| AppError::NotFound("collection".into()))
}

#[axum::debug_handler]
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let collection = known_collection(&collection)?;
    let submissions = FormSubmission::list(&state.mongo, collection, LIST_LIMIT).await?;
    Ok(success_to_api_response(submissions))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmissionStatusRequest {
    #[validate(length(min = 1, max = 60, message = "status must be 1 to 60 characters"))]
    pub status: String,
}

#[axum::debug_handler]
pub async fn set_submission_status(
    State(state): State<AppState>,
    Path((collection, submission_id)): Path<(String, String)>,
    Json(req): Json<SubmissionStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let collection = known_collection(&collection)?;
    FormSubmission::set_status(&state.mongo, collection, &submission_id, &req.status).await?;
    Ok(success_to_api_response(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
pub struct FileListQuery {
    pub prefix: Option<String>,
}

#[axum::debug_handler]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FileListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let objects = state.storage.list(query.prefix.as_deref()).await?;
    Ok(success_to_api_response(objects))
}

#[axum::debug_handler]
pub async fn list_contact_submissions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let submissions = ContactSubmission::list(&state.pool, LIST_LIMIT).await?;
    Ok(success_to_api_response(submissions))
}

#[axum::debug_handler]
pub async fn list_newsletter_subscribers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let subscribers = NewsletterSubscriber::list(&state.pool).await?;
    Ok(success_to_api_response(subscribers))
}
