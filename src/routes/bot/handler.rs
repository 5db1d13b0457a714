use axum::{
    extract::{Extension, Json, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::error::AppError;
use crate::routes::ticket::model::{SENDER_BOT, SENDER_USER, Ticket};
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

use super::model::{BotResponse, match_response};

const FALLBACK_REPLY: &str =
    "Thanks, your message has been forwarded to our support team. \
     You will get a reply on this ticket shortly.";
const CHAT_SUBJECT: &str = "Support chat";

#[derive(Debug, serde::Deserialize, Validate)]
pub struct ChatMessageRequest {
    #[validate(length(min = 1, max = 2000, message = "message must be 1 to 2000 characters"))]
    pub text: String,
    pub ticket_id: Option<String>,
}

/// 先走应答表,命中直接回;没命中就落到工单里等人工
#[axum::debug_handler]
pub async fn chat_message(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<ChatMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let responses = BotResponse::cached_list(&state.pool, &state.redis).await?;

    if let Some(matched) = match_response(&responses, &req.text) {
        // 有正在进行的工单时把问答也记录进去
        let ticket_id = match &req.ticket_id {
            Some(ticket_id) => {
                let ticket = Ticket::find(&state.pool, ticket_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("ticket".into()))?;
                if ticket.user_id != claims.sub && !claims.is_admin() {
                    return Err(AppError::Forbidden);
                }
                Ticket::append_message(&state.pool, ticket_id, SENDER_USER, &req.text).await?;
                let ticket =
                    Ticket::append_message(&state.pool, ticket_id, SENDER_BOT, &matched.response)
                        .await?;
                Some(ticket.ticket_id)
            }
            None => None,
        };

        return Ok(success_to_api_response(serde_json::json!({
            "reply": matched.response,
            "source": "bot",
            "ticket_id": ticket_id,
        })));
    }

    let ticket = match Ticket::find_open_for_user(&state.pool, &claims.sub).await? {
        Some(ticket) => {
            Ticket::append_message(&state.pool, &ticket.ticket_id, SENDER_USER, &req.text).await?
        }
        None => {
            Ticket::create(&state.pool, &claims.sub, CHAT_SUBJECT, &req.text, SENDER_USER).await?
        }
    };

    Ok(success_to_api_response(serde_json::json!({
        "reply": FALLBACK_REPLY,
        "source": "human",
        "ticket_id": ticket.ticket_id,
    })))
}
