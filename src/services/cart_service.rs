use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartItemResponse, CartResponse, UpdateQuantityRequest},
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{self, ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        products::{self, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    pricing,
    response::{ApiResponse, Meta},
    state::AppState,
};

const MAX_LINE_QUANTITY: i32 = 100;

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartResponse>> {
    let cart = get_or_create_cart(&state.orm, user.user_id).await?;
    let resp = build_cart_response(&state.orm, cart).await?;
    Ok(ApiResponse::success("Cart", resp, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartResponse>> {
    validate_quantity(payload.quantity)?;

    let txn = state.orm.begin().await?;

    // Lock the product row so the availability check and the cart write
    // observe one consistent stock value.
    let product = Products::find_by_id(payload.product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound("Product".into())),
    };

    if !product.is_available() {
        return Err(AppError::ProductUnavailable {
            name: product.name.clone(),
        });
    }
    if payload.quantity > product.stock_qty {
        return Err(AppError::InsufficientStock {
            name: product.name.clone(),
            requested: payload.quantity,
            available: product.stock_qty,
        });
    }

    let cart = get_or_create_cart(&txn, user.user_id).await?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product.id)),
        )
        .one(&txn)
        .await?;

    match existing {
        // Merge: one row per (cart, product). The combined quantity is
        // validated against live stock, not just the delta.
        Some(item) => {
            let combined = item.quantity + payload.quantity;
            if combined > MAX_LINE_QUANTITY {
                return Err(AppError::InvalidQuantity(format!(
                    "Cart quantity cannot exceed {MAX_LINE_QUANTITY}"
                )));
            }
            if combined > product.stock_qty {
                return Err(AppError::InsufficientStock {
                    name: product.name.clone(),
                    requested: combined,
                    available: product.stock_qty,
                });
            }
            let mut active: CartItemActive = item.into();
            active.quantity = Set(combined);
            active.update(&txn).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(payload.quantity),
                added_at: NotSet,
            }
            .insert(&txn)
            .await?;
        }
    }

    touch_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let cart = find_cart(&state.orm, user.user_id).await?;
    let resp = build_cart_response(&state.orm, cart).await?;
    Ok(ApiResponse::success("Added to cart", resp, Some(Meta::empty())))
}

pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateQuantityRequest,
) -> AppResult<ApiResponse<CartResponse>> {
    if payload.quantity > MAX_LINE_QUANTITY {
        return Err(AppError::InvalidQuantity(format!(
            "Cart quantity cannot exceed {MAX_LINE_QUANTITY}"
        )));
    }

    let txn = state.orm.begin().await?;

    let cart = find_cart(&txn, user.user_id).await?;

    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product_id)),
        )
        .one(&txn)
        .await?;
    let item = match item {
        Some(i) => i,
        None => return Err(AppError::NotFound("CartItem".into())),
    };

    if payload.quantity <= 0 {
        // Zero or negative means remove the line entirely.
        item.delete(&txn).await?;
    } else {
        let product = Products::find_by_id(product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".into()))?;

        if payload.quantity > product.stock_qty {
            return Err(AppError::InsufficientStock {
                name: product.name.clone(),
                requested: payload.quantity,
                available: product.stock_qty,
            });
        }

        // Replace, not add.
        let mut active: CartItemActive = item.into();
        active.quantity = Set(payload.quantity);
        active.update(&txn).await?;
    }

    touch_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let cart = find_cart(&state.orm, user.user_id).await?;
    let resp = build_cart_response(&state.orm, cart).await?;
    Ok(ApiResponse::success("Cart updated", resp, Some(Meta::empty())))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartResponse>> {
    let txn = state.orm.begin().await?;

    let cart = find_cart(&txn, user.user_id).await?;

    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product_id)),
        )
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("CartItem".into()));
    }

    touch_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let cart = find_cart(&state.orm, user.user_id).await?;
    let resp = build_cart_response(&state.orm, cart).await?;
    Ok(ApiResponse::success("Removed from cart", resp, Some(Meta::empty())))
}

/// Empty the cart but keep the cart row itself.
pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartResponse>> {
    let txn = state.orm.begin().await?;

    let cart = find_cart(&txn, user.user_id).await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    touch_cart(&txn, &cart).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        Some("cart_items"),
        Some(serde_json::json!({ "cart_id": cart.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let cart = find_cart(&state.orm, user.user_id).await?;
    let resp = build_cart_response(&state.orm, cart).await?;
    Ok(ApiResponse::success("Cart cleared", resp, Some(Meta::empty())))
}

fn validate_quantity(quantity: i32) -> AppResult<()> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(AppError::InvalidQuantity(format!(
            "Quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

async fn find_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<carts::Model> {
    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart".into()))
}

/// Idempotent get-or-create: the cart row appears on first access and is
/// never deleted afterwards.
pub async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<carts::Model> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(cart);
    }

    let user = Users::find_by_id(user_id).one(conn).await?;
    if user.is_none() {
        return Err(AppError::NotFound("User".into()));
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(cart)
}

async fn touch_cart<C: ConnectionTrait>(conn: &C, cart: &carts::Model) -> AppResult<()> {
    let mut active: CartActive = cart.clone().into();
    active.updated_at = Set(Utc::now().into());
    active.update(conn).await?;
    Ok(())
}

/// Cart lines dereference the live product: price, name and subtotal are
/// whatever the catalog says right now. Order responses are the opposite,
/// they only ever show the frozen snapshot.
async fn build_cart_response<C: ConnectionTrait>(
    conn: &C,
    cart: carts::Model,
) -> AppResult<CartResponse> {
    let rows: Vec<(crate::entity::cart_items::Model, Option<products::Model>)> = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .all(conn)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut total_items = 0;
    let mut total_price = Decimal::ZERO;

    for (item, product) in rows {
        let product = product.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item references missing product"))
        })?;
        let subtotal = pricing::line_subtotal(product.price, item.quantity);
        total_items += item.quantity;
        total_price += subtotal;
        items.push(CartItemResponse {
            id: item.id,
            product_id: product.id,
            product_name: product.name,
            product_brand: product.brand,
            product_price: product.price,
            quantity: item.quantity,
            subtotal,
        });
    }

    Ok(CartResponse {
        id: cart.id,
        user_id: cart.user_id,
        items,
        total_items,
        total_price,
        updated_at: cart.updated_at.with_timezone(&Utc),
    })
}
