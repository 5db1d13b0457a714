use std::sync::Arc;

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::AppError;

// 机器人应答表走缓存,管理端一改就整体失效
const RESPONSES_CACHE_KEY: &str = "bot:responses";
const RESPONSES_CACHE_EXPIRE: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BotResponse {
    pub response_id: String,
    pub trigger: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertBotResponseRequest {
    #[validate(length(min = 2, max = 120, message = "trigger must be 2 to 120 characters"))]
    pub trigger: String,
    #[validate(length(min = 1, max = 2000, message = "response must be 1 to 2000 characters"))]
    pub response: String,
}

const RESPONSE_COLUMNS: &str = "response_id, trigger, response, created_at, updated_at";

impl BotResponse {
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, AppError> {
        let responses = sqlx::query_as::<_, BotResponse>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM bot_responses ORDER BY trigger"
        ))
        .fetch_all(pool)
        .await?;

        Ok(responses)
    }

    pub async fn cached_list(
        pool: &PgPool,
        redis: &Arc<redis::Client>,
    ) -> Result<Vec<Self>, AppError> {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(RESPONSES_CACHE_KEY).await;
            if let Ok(json_str) = cached {
                if let Ok(responses) = serde_json::from_str::<Vec<BotResponse>>(&json_str) {
                    tracing::debug!("bot responses served from cache");
                    return Ok(responses);
                }
            }
        }

        let responses = Self::list_all(pool).await?;

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&responses) {
                let _: Result<(), redis::RedisError> = conn
                    .set_ex(RESPONSES_CACHE_KEY, json_str, RESPONSES_CACHE_EXPIRE)
                    .await;
            }
        }

        Ok(responses)
    }

    pub async fn invalidate_cache(redis: &Arc<redis::Client>) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let _: Result<(), redis::RedisError> = conn.del(RESPONSES_CACHE_KEY).await;
        }
    }

    pub async fn create(
        pool: &PgPool,
        req: &UpsertBotResponseRequest,
    ) -> Result<Self, AppError> {
        let result = sqlx::query_as::<_, BotResponse>(&format!(
            "INSERT INTO bot_responses (response_id, trigger, response)
             VALUES ($1, $2, $3)
             RETURNING {RESPONSE_COLUMNS}"
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(req.trigger.trim().to_lowercase())
        .bind(&req.response)
        .fetch_one(pool)
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(AppError::field("trigger", "trigger already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(
        pool: &PgPool,
        response_id: &str,
        req: &UpsertBotResponseRequest,
    ) -> Result<Self, AppError> {
        let response = sqlx::query_as::<_, BotResponse>(&format!(
            "UPDATE bot_responses
             SET trigger = $2, response = $3, updated_at = now()
             WHERE response_id = $1
             RETURNING {RESPONSE_COLUMNS}"
        ))
        .bind(response_id)
        .bind(req.trigger.trim().to_lowercase())
        .bind(&req.response)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("bot response".into()))?;

        Ok(response)
    }

    pub async fn delete(pool: &PgPool, response_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM bot_responses WHERE response_id = $1")
            .bind(response_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("bot response".into()));
        }
        Ok(())
    }
}

/// 大小写不敏感的包含匹配;多条命中时取触发词最长的那条
pub fn match_response<'a>(responses: &'a [BotResponse], text: &str) -> Option<&'a BotResponse> {
    let text = text.to_lowercase();
    responses
        .iter()
        .filter(|r| !r.trigger.is_empty() && text.contains(&r.trigger.to_lowercase()))
        .max_by_key(|r| r.trigger.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(trigger: &str, reply: &str) -> BotResponse {
        BotResponse {
            response_id: format!("br-{trigger}"),
            trigger: trigger.into(),
            response: reply.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn match_is_case_insensitive() {
        let responses = vec![response("gst", "gst info")];
        let found = match_response(&responses, "How long does GST registration take?");
        assert_eq!(found.unwrap().response, "gst info");
    }

    #[test]
    fn longest_trigger_wins() {
        let responses = vec![
            response("gst", "generic"),
            response("gst return", "specific"),
        ];
        let found = match_response(&responses, "help with my gst return please");
        assert_eq!(found.unwrap().response, "specific");
    }

    #[test]
    fn no_trigger_no_match() {
        let responses = vec![response("itr", "itr info")];
        assert!(match_response(&responses, "what are your office timings?").is_none());
    }
}
