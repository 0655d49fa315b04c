use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// Live cart line: `product_price` and `subtotal` are read from the product
/// at response time, so they move when the catalog price moves.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_brand: Option<String>,
    pub product_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Totals are derived on read, never stored.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItemResponse>,
    pub total_items: i32,
    pub total_price: Decimal,
    pub updated_at: DateTime<Utc>,
}
