use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub mongodb_url: String,
    pub mongodb_db: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub base_url: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_url: Option<String>,
    pub upload_max_bytes: u64,
    pub presign_expire_secs: u64,
    pub payment_merchant_id: String,
    pub payment_merchant_key: String,
    pub payment_passphrase: Option<String>,
    pub payment_gateway_url: String,
    pub payment_validate_url: Option<String>,
    pub smtp_host: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,
    pub admin_notify_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            mongodb_url: env::var("MONGODB_URL")?,
            mongodb_db: env::var("MONGODB_DB").unwrap_or_else(|_| "filings".into()),
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")?.parse().unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")?.parse().unwrap_or(100),
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            base_url: env::var("BASE_URL")?,
            s3_bucket: env::var("S3_BUCKET")?,
            s3_region: env::var("S3_REGION")?,
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_public_url: env::var("S3_PUBLIC_URL").ok(),
            upload_max_bytes: env::var("UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            presign_expire_secs: env::var("PRESIGN_EXPIRE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            payment_merchant_id: env::var("PAYMENT_MERCHANT_ID")?,
            payment_merchant_key: env::var("PAYMENT_MERCHANT_KEY")?,
            payment_passphrase: env::var("PAYMENT_PASSPHRASE").ok(),
            payment_gateway_url: env::var("PAYMENT_GATEWAY_URL")?,
            payment_validate_url: env::var("PAYMENT_VALIDATE_URL").ok(),
            smtp_host: env::var("SMTP_HOST")?,
            smtp_username: env::var("SMTP_USERNAME")?,
            smtp_password: env::var("SMTP_PASSWORD")?,
            smtp_from: env::var("SMTP_FROM")?,
            admin_notify_email: env::var("ADMIN_NOTIFY_EMAIL")?,
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn presign_expire(&self) -> Duration {
        Duration::from_secs(self.presign_expire_secs)
    }
}
