use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::AppError, utils::Claims, utils::verify_token};

/// 校验 Bearer token，把 Claims 注入到请求扩展里
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = auth_header.ok_or(AppError::Unauthorized)?;

    let claims = verify_token(bearer.token(), &state.config).map_err(|e| {
        tracing::debug!("token verification failed: {}", e);
        AppError::Unauthorized
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// 管理端路由的角色门槛，必须挂在 auth_middleware 之后
pub async fn require_admin(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::Unauthorized)?;

    if !claims.is_admin() {
        tracing::warn!("user {} denied admin access", claims.sub);
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, http::StatusCode, middleware, routing::put};
    use tower::ServiceExt;

    use crate::utils::{Claims, ROLE_ADMIN, ROLE_USER};

    fn claims(role: &str) -> Claims {
        Claims {
            sub: "u-1".into(),
            email: "user@example.com".into(),
            role: role.into(),
            exp: i64::MAX,
            iat: 0,
        }
    }

    fn admin_router() -> Router {
        Router::new()
            .route("/admin/bot-responses/{id}", put(|| async { "updated" }))
            .layer(middleware::from_fn(super::require_admin))
    }

    #[tokio::test]
    async fn non_admin_is_rejected_before_handler() {
        let mut request = Request::builder()
            .method("PUT")
            .uri("/admin/bot-responses/br-1")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(claims(ROLE_USER));

        let response = admin_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_claims_is_unauthorized() {
        let request = Request::builder()
            .method("PUT")
            .uri("/admin/bot-responses/br-1")
            .body(Body::empty())
            .unwrap();

        let response = admin_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_passes_through() {
        let mut request = Request::builder()
            .method("PUT")
            .uri("/admin/bot-responses/br-1")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(claims(ROLE_ADMIN));

        let response = admin_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
