use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub mrp: f64,
    pub sale_price: f64,
    pub image_url: Option<String>,
    pub active: bool,
}

const PRODUCT_COLUMNS: &str =
    "product_id, name, description, category, mrp, sale_price, image_url, active";

impl Product {
    /// 打折价大于零时生效,否则按原价卖
    pub fn unit_price(&self) -> f64 {
        if self.sale_price > 0.0 {
            self.sale_price
        } else {
            self.mrp
        }
    }

    pub async fn list_active(
        pool: &PgPool,
        category: Option<&str>,
    ) -> Result<Vec<Self>, AppError> {
        let products = match category {
            Some(category) => {
                sqlx::query_as::<_, Product>(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products
                     WHERE active AND category = $1
                     ORDER BY name"
                ))
                .bind(category)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Product>(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE active ORDER BY name"
                ))
                .fetch_all(pool)
                .await?
            }
        };

        Ok(products)
    }

    pub async fn find(pool: &PgPool, product_id: &str) -> Result<Option<Self>, AppError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        Ok(product)
    }
}
