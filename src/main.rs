use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use backend::{
    AppState,
    config::Config,
    mailer::Mailer,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit, require_admin},
    routes,
    storage::ObjectStorage,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 关系库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'taxdesk_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 文档库
    let mongo_client = mongodb::Client::with_uri_str(&config.mongodb_url)
        .await
        .expect("Failed to connect to MongoDB");
    let mongo = mongo_client.database(&config.mongodb_db);

    // Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 对象存储与邮件通道
    let storage = ObjectStorage::from_config(&config).await;
    let mailer = Mailer::from_config(&config).expect("Failed to build SMTP transport");

    // 应用状态
    let state = AppState {
        pool,
        mongo,
        redis: redis_arc,
        storage,
        mailer,
        config: config.clone(),
    };

    // 限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 公开路由
    let public_routes = Router::new()
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login))
        .route("/users/forgot-password", post(routes::user::forgot_password))
        .route("/users/reset-password", post(routes::user::reset_password))
        .route("/products", get(routes::product::list_products))
        .route("/products/{product_id}", get(routes::product::get_product))
        .route("/forms", get(routes::form::list_forms))
        .route("/forms/{form_id}", get(routes::form::get_form))
        .route("/contact", post(routes::contact::submit_contact))
        .route("/newsletter", post(routes::contact::subscribe_newsletter))
        // 网关回调不带会话,靠验签把关
        .route("/payments/notify", post(routes::payment::payment_notify));

    // 需要登录的路由
    let protected_routes = Router::new()
        .route("/users/me", get(routes::user::me))
        .route("/users/me/services", get(routes::user::pending_services))
        .route("/users/profile", put(routes::user::update_profile))
        .route("/users/password", put(routes::user::update_password))
        .route("/users/profile-image", post(routes::user::upload_profile_image))
        .route(
            "/tickets",
            post(routes::ticket::create_ticket).get(routes::ticket::list_my_tickets),
        )
        .route("/tickets/{ticket_id}", get(routes::ticket::get_ticket))
        .route("/tickets/{ticket_id}/messages", post(routes::ticket::add_message))
        .route("/tickets/{ticket_id}/status", put(routes::ticket::set_status))
        .route("/chat/message", post(routes::bot::chat_message))
        .route("/forms/{form_id}/validate-step", post(routes::form::validate_form_step))
        .route("/forms/{form_id}/submit", post(routes::form::submit_form))
        .route("/uploads/sign", post(routes::upload::sign_upload))
        .route("/files/sign-get", get(routes::upload::sign_download))
        .route("/checkout", post(routes::payment::checkout))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 管理端路由:先过登录,再过角色
    let admin_routes = Router::new()
        .route("/admin/tickets", get(routes::admin::list_tickets))
        .route(
            "/admin/bot-responses",
            get(routes::admin::list_bot_responses).post(routes::admin::create_bot_response),
        )
        .route(
            "/admin/bot-responses/{response_id}",
            put(routes::admin::update_bot_response).delete(routes::admin::delete_bot_response),
        )
        .route(
            "/admin/submissions/{collection}",
            get(routes::admin::list_submissions),
        )
        .route(
            "/admin/submissions/{collection}/{submission_id}/status",
            put(routes::admin::set_submission_status),
        )
        .route("/admin/files", get(routes::admin::list_files))
        .route(
            "/admin/contact-submissions",
            get(routes::admin::list_contact_submissions),
        )
        .route(
            "/admin/newsletter-subscribers",
            get(routes::admin::list_newsletter_subscribers),
        )
        .layer(axum::middleware::from_fn(require_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new().nest(
        "/api",
        Router::new()
            .merge(public_routes)
            .merge(protected_routes)
            .merge(admin_routes),
    );

    // 日志、限流与请求体上限
    let router = router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit))
        .layer(DefaultBodyLimit::max(
            (state.config.upload_max_bytes as usize) + 1024 * 1024,
        ));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
