use axum::{
    body::Bytes,
    extract::{Extension, Json, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;

use crate::error::AppError;
use crate::routes::product::model::Product;
use crate::routes::user::model::{PfItem, User};
use crate::utils::{Claims, success_to_api_response};
use crate::AppState;

use super::model::{
    CartLine, CheckoutRequest, cart_total, gateway_fields, parse_notify_body, verify_signature,
};

/// 服务端按商品表重算价格,前端报的金额一概不信
#[axum::debug_handler]
pub async fn checkout(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut lines: Vec<CartLine> = Vec::new();
    for item in req.items.into_iter().filter(|i| i.count > 0) {
        let product = Product::find(&state.pool, &item.product_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| {
                AppError::field("items", &format!("unknown product {}", item.product_id))
            })?;
        lines.push(CartLine {
            product,
            count: item.count,
        });
    }

    if lines.is_empty() {
        return Err(AppError::field("items", "cart is empty"));
    }

    let user = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("user".into()))?;

    let amount = cart_total(&lines);
    let item_name = lines
        .iter()
        .map(|l| l.product.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    // 同一商品买几份就记几条,后续按条办结
    let item_ids_csv = lines
        .iter()
        .flat_map(|l| std::iter::repeat_n(l.product.product_id.as_str(), l.count as usize))
        .collect::<Vec<_>>()
        .join(",");
    let order_id = uuid::Uuid::new_v4().to_string();

    let fields = gateway_fields(
        &state.config,
        &user.name,
        &user.email,
        &order_id,
        amount,
        &item_name,
        &item_ids_csv,
    );

    let ordered: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|(name, value)| (name, serde_json::Value::String(value)))
        .collect();

    tracing::info!("checkout order {} for {} at {:.2}", order_id, claims.sub, amount);
    Ok(success_to_api_response(serde_json::json!({
        "gateway_url": state.config.payment_gateway_url,
        "order_id": order_id,
        "amount": format!("{:.2}", amount),
        "fields": ordered,
    })))
}

/// 网关异步回调:先验签(可选再回源确认),确认后才动用户数据
#[axum::debug_handler]
pub async fn payment_notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let pairs = parse_notify_body(content_type, &body)
        .ok_or_else(|| AppError::BadRequest("unreadable notification payload".into()))?;

    if !verify_signature(&pairs, state.config.payment_passphrase.as_deref()) {
        tracing::warn!("payment notification rejected: signature mismatch");
        return Err(AppError::BadRequest("signature verification failed".into()));
    }

    if let Some(validate_url) = &state.config.payment_validate_url {
        confirm_with_gateway(validate_url, &pairs).await?;
    }

    let get = |name: &str| {
        pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    };

    if let Some(status) = get("payment_status") {
        if status != "COMPLETE" {
            tracing::info!("ignoring notification with payment_status {}", status);
            return Ok(success_to_api_response(serde_json::json!({})));
        }
    }

    let email = get("email_address")
        .ok_or_else(|| AppError::BadRequest("missing email_address".into()))?;

    let now = Utc::now().timestamp_millis();
    let items: Vec<PfItem> = get("custom_str1")
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| PfItem {
            name: name.to_string(),
            timestamp: now,
        })
        .collect();

    if !items.is_empty() {
        let matched = User::append_pf_items(&state.pool, email, &items).await?;
        if !matched {
            tracing::warn!("payment notification for unknown account");
            return Err(AppError::NotFound("user".into()));
        }
        tracing::info!("recorded {} purchased item(s) for {}", items.len(), email);
    }

    Ok(success_to_api_response(serde_json::json!({})))
}

/// 把原样报文回传给网关确认,应答不是 VALID 就拒绝
async fn confirm_with_gateway(
    validate_url: &str,
    pairs: &[(String, String)],
) -> Result<(), AppError> {
    let body = pairs
        .iter()
        .map(|(name, value)| {
            format!("{}={}", name, urlencoding::encode(value).replace("%20", "+"))
        })
        .collect::<Vec<_>>()
        .join("&");

    let response = reqwest::Client::new()
        .post(validate_url)
        .header(
            reqwest::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(body)
        .send()
        .await
        .map_err(|e| AppError::upstream("gateway validate", e))?;

    let text = response
        .text()
        .await
        .map_err(|e| AppError::upstream("gateway validate", e))?;

    if text.trim() != "VALID" {
        tracing::warn!("gateway validation answered {:?}", text.trim());
        return Err(AppError::BadRequest("gateway rejected the notification".into()));
    }
    Ok(())
}
