use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::error::AppError;
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

use super::model::{
    AddMessageRequest, CreateTicketRequest, SENDER_ADMIN, SENDER_USER, SetStatusRequest, Ticket,
    TicketStatus,
};

fn can_access(claims: &Claims, ticket: &Ticket) -> bool {
    claims.is_admin() || ticket.user_id == claims.sub
}

#[axum::debug_handler]
pub async fn create_ticket(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let ticket =
        Ticket::create(&state.pool, &claims.sub, &req.subject, &req.message, SENDER_USER).await?;
    tracing::info!("ticket {} opened by {}", ticket.ticket_number, claims.sub);

    Ok((StatusCode::CREATED, success_to_api_response(ticket)))
}

#[axum::debug_handler]
pub async fn list_my_tickets(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let tickets = Ticket::list_for_user(&state.pool, &claims.sub).await?;
    Ok(success_to_api_response(tickets))
}

#[axum::debug_handler]
pub async fn get_ticket(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = Ticket::find(&state.pool, &ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound("ticket".into()))?;

    if !can_access(&claims, &ticket) {
        return Err(AppError::Forbidden);
    }

    Ok(success_to_api_response(ticket))
}

#[axum::debug_handler]
pub async fn add_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(req): Json<AddMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let ticket = Ticket::find(&state.pool, &ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound("ticket".into()))?;
    if !can_access(&claims, &ticket) {
        return Err(AppError::Forbidden);
    }

    let sender = if claims.is_admin() { SENDER_ADMIN } else { SENDER_USER };
    let ticket = Ticket::append_message(&state.pool, &ticket_id, sender, &req.text).await?;

    Ok(success_to_api_response(ticket))
}

/// 只有工单归属人或管理员能改状态
#[axum::debug_handler]
pub async fn set_status(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = TicketStatus::parse(&req.status)
        .ok_or_else(|| AppError::field("status", "expected open, in_progress or closed"))?;

    let ticket = Ticket::find(&state.pool, &ticket_id)
        .await?
        .ok_or_else(|| AppError::NotFound("ticket".into()))?;
    if !can_access(&claims, &ticket) {
        return Err(AppError::Forbidden);
    }

    let ticket = Ticket::set_status(&state.pool, &ticket_id, status).await?;
    Ok(success_to_api_response(ticket))
}
