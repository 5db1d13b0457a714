use std::sync::Arc;

use config::Config;
use mailer::Mailer;
use redis::Client as RedisClient;
use sqlx::PgPool;
use storage::ObjectStorage;

pub mod config;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod storage;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub mongo: mongodb::Database,
    pub redis: Arc<RedisClient>,
    pub storage: ObjectStorage,
    pub mailer: Mailer,
    pub config: Config,
}
