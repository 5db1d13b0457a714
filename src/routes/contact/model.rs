use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Serialize, FromRow)]
pub struct ContactSubmission {
    pub contact_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 2, max = 64, message = "name must be 2 to 64 characters"))]
    pub name: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 5, max = 2000, message = "message must be 5 to 2000 characters"))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewsletterRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct NewsletterSubscriber {
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl ContactSubmission {
    pub async fn create(pool: &PgPool, req: &ContactRequest) -> Result<Self, AppError> {
        let submission = sqlx::query_as::<_, ContactSubmission>(
            "INSERT INTO contact_submissions (contact_id, name, email, phone, message)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING contact_id, name, email, phone, message, created_at",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&req.name)
        .bind(req.email.to_lowercase())
        .bind(&req.phone)
        .bind(&req.message)
        .fetch_one(pool)
        .await?;

        Ok(submission)
    }

    pub async fn list(pool: &PgPool, limit: i64) -> Result<Vec<Self>, AppError> {
        let submissions = sqlx::query_as::<_, ContactSubmission>(
            "SELECT contact_id, name, email, phone, message, created_at
             FROM contact_submissions
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(submissions)
    }
}

impl NewsletterSubscriber {
    /// 重复订阅按成功处理
    pub async fn subscribe(pool: &PgPool, email: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO newsletter_subscribers (email)
             VALUES ($1)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(email.to_lowercase())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, AppError> {
        let subscribers = sqlx::query_as::<_, NewsletterSubscriber>(
            "SELECT email, created_at FROM newsletter_subscribers ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await?;

        Ok(subscribers)
    }
}
