use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::AppError;
use crate::utils::{ROLE_USER, hash_password, verify_password};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub pf_data: Json<PfData>,
    pub image_url: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 已购买、尚未办理的服务项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PfData {
    #[serde(default)]
    pub item_name: Vec<PfItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PfItem {
    pub name: String,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 72, message = "password must be 6 to 72 characters"))]
    pub password: String,
    #[validate(length(min = 2, max = 64, message = "name must be 2 to 64 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 64, message = "name must be 2 to 64 characters"))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 6, max = 72, message = "password must be 6 to 72 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    pub token: String,
    #[validate(length(min = 6, max = 72, message = "password must be 6 to 72 characters"))]
    pub new_password: String,
}

const USER_COLUMNS: &str = "user_id, email, name, password_hash, role, pf_data, image_url, \
                            reset_token, reset_token_expires, created_at, updated_at";

impl User {
    pub async fn create(pool: &PgPool, req: RegisterRequest) -> Result<Self, AppError> {
        let password_hash = hash_password(&req.password)?;
        let user_id = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (user_id, email, name, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user_id)
        .bind(req.email.to_lowercase())
        .bind(&req.name)
        .bind(&password_hash)
        .bind(ROLE_USER)
        .fetch_one(pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(AppError::field("email", "already registered"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub fn verify_login(&self, password: &str) -> Result<bool, AppError> {
        Ok(verify_password(password, &self.password_hash)?)
    }

    pub async fn update_profile(
        pool: &PgPool,
        user_id: &str,
        name: &str,
    ) -> Result<Self, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $1, updated_at = now()
             WHERE user_id = $2
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn update_password(
        pool: &PgPool,
        user_id: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let password_hash = hash_password(new_password)?;
        sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = now() WHERE user_id = $2",
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_reset_token(
        pool: &PgPool,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET reset_token = $1, reset_token_expires = $2, updated_at = now()
             WHERE email = $3",
        )
        .bind(token)
        .bind(expires)
        .bind(email.to_lowercase())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_password(pool: &PgPool, req: &ResetPasswordRequest) -> Result<(), AppError> {
        let user = Self::find_by_email(pool, &req.email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let valid = user.reset_token.as_deref() == Some(req.token.as_str())
            && user
                .reset_token_expires
                .map(|expiry| expiry > Utc::now())
                .unwrap_or(false);
        if !valid {
            return Err(AppError::Unauthorized);
        }

        let password_hash = hash_password(&req.new_password)?;
        sqlx::query(
            "UPDATE users
             SET password_hash = $1, reset_token = NULL, reset_token_expires = NULL,
                 updated_at = now()
             WHERE user_id = $2",
        )
        .bind(&password_hash)
        .bind(&user.user_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_image_url(
        pool: &PgPool,
        user_id: &str,
        image_url: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET image_url = $1, updated_at = now() WHERE user_id = $2")
            .bind(image_url)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// 支付回调写入:单条 UPDATE 里做 jsonb 拼接,不读回再写
    pub async fn append_pf_items(
        pool: &PgPool,
        email: &str,
        items: &[PfItem],
    ) -> Result<bool, AppError> {
        let payload = serde_json::to_string(items)
            .map_err(|e| AppError::upstream("pf_data encode", e))?;

        let result = sqlx::query(
            "UPDATE users
             SET pf_data = jsonb_set(
                     pf_data,
                     '{item_name}',
                     COALESCE(pf_data->'item_name', '[]'::jsonb) || $1::jsonb
                 ),
                 updated_at = now()
             WHERE email = $2",
        )
        .bind(&payload)
        .bind(email.to_lowercase())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 表单办结后扣减一条待办服务,时间戳最早的先扣。
    /// 行锁内读改写,避免并发提交互相覆盖。
    pub async fn consume_pf_item(
        pool: &PgPool,
        user_id: &str,
        item_name: &str,
    ) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;

        let pf_data: Json<PfData> = sqlx::query_scalar(
            "SELECT pf_data FROM users WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut pf_data = pf_data.0;
        if !remove_oldest(&mut pf_data.item_name, item_name) {
            tx.rollback().await?;
            return Ok(false);
        }

        let payload = serde_json::to_string(&pf_data)
            .map_err(|e| AppError::upstream("pf_data encode", e))?;
        sqlx::query(
            "UPDATE users SET pf_data = $1::jsonb, updated_at = now() WHERE user_id = $2",
        )
        .bind(&payload)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// 同名条目可能重复购买,只移除时间戳最早的那一条
pub fn remove_oldest(items: &mut Vec<PfItem>, name: &str) -> bool {
    let oldest = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.name == name)
        .min_by_key(|(_, item)| item.timestamp)
        .map(|(index, _)| index);

    match oldest {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_oldest_takes_earliest_duplicate() {
        let mut items = vec![
            PfItem { name: "2".into(), timestamp: 200 },
            PfItem { name: "2".into(), timestamp: 100 },
        ];
        assert!(remove_oldest(&mut items, "2"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].timestamp, 200);
    }

    #[test]
    fn remove_oldest_leaves_other_names_alone() {
        let mut items = vec![
            PfItem { name: "gst-registration".into(), timestamp: 10 },
            PfItem { name: "itr-filing".into(), timestamp: 5 },
        ];
        assert!(remove_oldest(&mut items, "gst-registration"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "itr-filing");
    }

    #[test]
    fn remove_oldest_missing_name_is_noop() {
        let mut items = vec![PfItem { name: "itr-filing".into(), timestamp: 5 }];
        assert!(!remove_oldest(&mut items, "gst-return"));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn pf_data_tolerates_missing_item_list() {
        let pf: PfData = serde_json::from_str("{}").unwrap();
        assert!(pf.item_name.is_empty());
    }
}
