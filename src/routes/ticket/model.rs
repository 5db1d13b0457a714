use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::AppError;

pub const SENDER_USER: &str = "user";
pub const SENDER_ADMIN: &str = "admin";
pub const SENDER_BOT: &str = "bot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }
}

/// 消息的唯一规范形态,读写两侧都只认它
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub message_id: String,
    pub text: String,
    pub sender: String,
    pub timestamp: i64,
}

#[derive(Debug, FromRow)]
struct TicketRow {
    ticket_id: String,
    ticket_number: String,
    user_id: String,
    subject: String,
    status: String,
    messages: Json<Value>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub ticket_number: String,
    pub user_id: String,
    pub subject: String,
    pub status: String,
    pub messages: Vec<TicketMessage>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        let messages = normalize_messages(&row.messages.0);
        Ticket {
            ticket_id: row.ticket_id,
            ticket_number: row.ticket_number,
            user_id: row.user_id,
            subject: row.subject,
            status: row.status,
            messages,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTicketRequest {
    #[validate(length(min = 3, max = 120, message = "subject must be 3 to 120 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 2000, message = "message must be 1 to 2000 characters"))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMessageRequest {
    #[validate(length(min = 1, max = 2000, message = "message must be 1 to 2000 characters"))]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

const TICKET_COLUMNS: &str =
    "ticket_id, ticket_number, user_id, subject, status, messages, created_at, updated_at";

fn new_message(sender: &str, text: &str) -> TicketMessage {
    TicketMessage {
        message_id: uuid::Uuid::new_v4().to_string(),
        text: text.to_string(),
        sender: sender.to_string(),
        timestamp: Utc::now().timestamp_millis(),
    }
}

fn new_ticket_number() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("TKT-{}", &suffix[..8].to_uppercase())
}

impl Ticket {
    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        subject: &str,
        first_message: &str,
        sender: &str,
    ) -> Result<Self, AppError> {
        let message = new_message(sender, first_message);
        let messages = serde_json::to_string(&vec![message])
            .map_err(|e| AppError::upstream("message encode", e))?;

        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "INSERT INTO tickets (ticket_id, ticket_number, user_id, subject, status, messages)
             VALUES ($1, $2, $3, $4, 'open', $5::jsonb)
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(new_ticket_number())
        .bind(user_id)
        .bind(subject)
        .bind(&messages)
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    pub async fn find(pool: &PgPool, ticket_id: &str) -> Result<Option<Self>, AppError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Ticket::from))
    }

    pub async fn list_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    pub async fn list_all(
        pool: &PgPool,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Self>, AppError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, TicketRow>(&format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets WHERE status = $1
                     ORDER BY updated_at DESC"
                ))
                .bind(status.as_str())
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TicketRow>(&format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets ORDER BY updated_at DESC"
                ))
                .fetch_all(pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    pub async fn find_open_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE user_id = $1 AND status != 'closed'
             ORDER BY updated_at DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Ticket::from))
    }

    /// 追加消息走单条 UPDATE 的 jsonb 拼接,并发追加不会互相覆盖;
    /// 管理员回复时在同一条语句里把状态推成 in_progress
    pub async fn append_message(
        pool: &PgPool,
        ticket_id: &str,
        sender: &str,
        text: &str,
    ) -> Result<Self, AppError> {
        let message = new_message(sender, text);
        let payload = serde_json::to_string(&vec![message])
            .map_err(|e| AppError::upstream("message encode", e))?;

        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets
             SET messages = messages || $2::jsonb,
                 status = CASE WHEN $3 THEN 'in_progress' ELSE status END,
                 updated_at = now()
             WHERE ticket_id = $1
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(&payload)
        .bind(sender == SENDER_ADMIN)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("ticket".into()))?;

        Ok(row.into())
    }

    pub async fn set_status(
        pool: &PgPool,
        ticket_id: &str,
        status: TicketStatus,
    ) -> Result<Self, AppError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET status = $2, updated_at = now()
             WHERE ticket_id = $1
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(status.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("ticket".into()))?;

        Ok(row.into())
    }
}

/// 存量数据里 messages 可能是数组,也可能是整段 JSON 字符串;
/// 字段名还有 text/content、sender/role、createdAt/timestamp 几代别名。
/// 全部在这一处收敛成规范形态,解析不动的整体按空列表处理。
pub fn normalize_messages(stored: &Value) -> Vec<TicketMessage> {
    let array = match stored {
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Array(array)) => array,
            Ok(_) => {
                tracing::warn!("stored messages decoded to a non-array, dropping");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("failed to parse stored message string: {}", e);
                return Vec::new();
            }
        },
        Value::Array(array) => array.clone(),
        other => {
            tracing::warn!("stored messages have type {}, dropping", type_name(other));
            return Vec::new();
        }
    };

    let mut messages: Vec<TicketMessage> = array
        .iter()
        .filter_map(normalize_message)
        .collect();
    messages.sort_by_key(|m| m.timestamp);
    messages
}

fn normalize_message(value: &Value) -> Option<TicketMessage> {
    let object = value.as_object()?;

    let text = object
        .get("text")
        .or_else(|| object.get("content"))?
        .as_str()?
        .to_string();
    let sender = object
        .get("sender")
        .or_else(|| object.get("role"))
        .and_then(|v| v.as_str())
        .unwrap_or(SENDER_USER)
        .to_string();
    let message_id = object
        .get("message_id")
        .or_else(|| object.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let timestamp = object
        .get("timestamp")
        .or_else(|| object.get("createdAt"))
        .map(normalize_timestamp)
        .unwrap_or(0);

    Some(TicketMessage {
        message_id,
        text,
        sender,
        timestamp,
    })
}

fn normalize_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0),
        _ => 0,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_sort_by_timestamp_regardless_of_order() {
        let stored = json!([
            {"message_id": "b", "text": "second", "sender": "admin", "timestamp": 2000},
            {"message_id": "a", "text": "first", "sender": "user", "timestamp": 1000},
            {"message_id": "c", "text": "third", "sender": "user", "timestamp": 3000},
        ]);
        let messages = normalize_messages(&stored);
        let ids: Vec<&str> = messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn string_encoded_array_is_parsed() {
        let inner = json!([
            {"id": "m1", "content": "hello", "role": "user", "createdAt": 500}
        ]);
        let stored = Value::String(inner.to_string());
        let messages = normalize_messages(&stored);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m1");
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].sender, "user");
        assert_eq!(messages[0].timestamp, 500);
    }

    #[test]
    fn legacy_aliases_map_to_canonical_fields() {
        let stored = json!([
            {"id": "m1", "content": "old shape", "role": "admin",
             "createdAt": "2023-04-01T10:00:00Z"},
            {"message_id": "m2", "text": "new shape", "sender": "user", "timestamp": 1}
        ]);
        let messages = normalize_messages(&stored);
        assert_eq!(messages.len(), 2);
        // RFC3339 时间转成毫秒后排在数值时间戳之后
        assert_eq!(messages[0].message_id, "m2");
        assert_eq!(messages[1].sender, "admin");
        assert!(messages[1].timestamp > 0);
    }

    #[test]
    fn unparseable_payload_degrades_to_empty() {
        let stored = Value::String("{not json".to_string());
        assert!(normalize_messages(&stored).is_empty());

        let stored = json!({"oops": true});
        assert!(normalize_messages(&stored).is_empty());
    }

    #[test]
    fn elements_without_text_are_skipped() {
        let stored = json!([
            "stray string",
            {"sender": "user", "timestamp": 10},
            {"message_id": "ok", "text": "kept", "sender": "user", "timestamp": 20}
        ]);
        let messages = normalize_messages(&stored);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "ok");
    }

    #[test]
    fn status_round_trip() {
        for status in [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Closed] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TicketStatus::parse("reopened"), None);
    }
}
