use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::utils::success_to_api_response;
use crate::AppState;

use super::model::Product;

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
}

#[axum::debug_handler]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let products = Product::list_active(&state.pool, query.category.as_deref()).await?;
    Ok(success_to_api_response(products))
}

#[axum::debug_handler]
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let product = Product::find(&state.pool, &product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("product".into()))?;

    Ok(success_to_api_response(product))
}
