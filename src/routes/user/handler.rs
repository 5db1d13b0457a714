use axum::{
    extract::{Extension, Json, Multipart, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use validator::Validate;

use crate::error::AppError;
use crate::utils::{Claims, generate_token, success_to_api_response};
use crate::AppState;

use super::model::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    UpdatePasswordRequest, UpdateProfileRequest, User,
};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let user = User::create(&state.pool, req).await?;
    let (token, expires_at) =
        generate_token(&user.user_id, &user.email, &user.role, &state.config)?;

    tracing::info!("registered user {}", user.user_id);
    Ok(success_to_api_response(AuthResponse {
        user_id: user.user_id,
        name: user.name,
        role: user.role,
        token,
        expires_at,
    }))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.verify_login(&req.password)? {
        return Err(AppError::Unauthorized);
    }

    let (token, expires_at) =
        generate_token(&user.user_id, &user.email, &user.role, &state.config)?;

    Ok(success_to_api_response(AuthResponse {
        user_id: user.user_id,
        name: user.name,
        role: user.role,
        token,
        expires_at,
    }))
}

#[axum::debug_handler]
pub async fn me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn update_profile(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let user = User::update_profile(&state.pool, &claims.sub, &req.name).await?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn update_password(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;
    if !user.verify_login(&req.current_password)? {
        return Err(AppError::field("current_password", "incorrect password"));
    }

    User::update_password(&state.pool, &claims.sub, &req.new_password).await?;
    Ok(success_to_api_response(serde_json::json!({})))
}

/// 无论邮箱是否存在都返回成功,避免被用来探测账号
#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let token = uuid::Uuid::new_v4().to_string();
    let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

    if User::set_reset_token(&state.pool, &req.email, &token, expires).await? {
        let reset_link = format!(
            "{}/reset-password?email={}&token={}",
            state.config.base_url,
            urlencoding::encode(&req.email),
            token
        );
        state
            .mailer
            .send(
                &req.email,
                "Password reset",
                format!(
                    "A password reset was requested for your account.\n\n\
                     Reset link (valid for {} hour): {}\n\n\
                     If you did not request this, you can ignore this mail.",
                    RESET_TOKEN_TTL_HOURS, reset_link
                ),
            )
            .await?;
    }

    Ok(success_to_api_response(serde_json::json!({})))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    User::reset_password(&state.pool, &req).await?;
    tracing::info!("password reset completed for {}", req.email);
    Ok(success_to_api_response(serde_json::json!({})))
}

#[axum::debug_handler]
pub async fn upload_profile_image(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("image").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;

        if bytes.len() as u64 > state.config.upload_max_bytes {
            return Err(AppError::field("image", "file exceeds the upload size limit"));
        }

        let key = format!("profile-images/{}/{}", claims.sub, file_name);
        let url = state
            .storage
            .put_object(&key, &content_type, bytes.to_vec())
            .await?;
        User::set_image_url(&state.pool, &claims.sub, &url).await?;

        return Ok(success_to_api_response(serde_json::json!({
            "image_url": url
        })));
    }

    Err(AppError::field("image", "missing image field"))
}

#[axum::debug_handler]
pub async fn pending_services(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

    Ok(success_to_api_response(user.pf_data.0.item_name))
}
