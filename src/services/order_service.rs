use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ActiveEnum, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CreateOrderRequest, OrderItemResponse, OrderList, OrderResponse, OrderSummary,
        PayOrderRequest,
    },
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus,
            PaymentStatus,
        },
        payments::ActiveModel as PaymentActive,
        products::Entity as Products,
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    pricing::{self, SnapshotLine},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
    stock,
};

const MAX_LINE_QUANTITY: i32 = 100;

/// Place an order atomically: validate the user and every line, snapshot
/// names and prices, persist order + items, reduce stock and clear the cart
/// in one transaction. Any failure rolls the whole thing back; stock and
/// order state never diverge.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderResponse>> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest(
            "Order must have at least one item".into(),
        ));
    }
    for item in &payload.items {
        if item.quantity < 1 || item.quantity > MAX_LINE_QUANTITY {
            return Err(AppError::InvalidQuantity(format!(
                "Quantity must be between 1 and {MAX_LINE_QUANTITY}"
            )));
        }
    }

    let txn = state.orm.begin().await?;

    let buyer = Users::find_by_id(user.user_id).one(&txn).await?;
    let buyer = match buyer {
        Some(u) => u,
        None => return Err(AppError::NotFound("User".into())),
    };
    if !buyer.active {
        return Err(AppError::BadRequest("Account is deactivated".into()));
    }

    // Resolve every product under a row lock and take the snapshot at this
    // instant. Later catalog edits must not affect this order.
    let mut lines: Vec<SnapshotLine> = Vec::with_capacity(payload.items.len());
    let mut locked_products = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let product = Products::find_by_id(item.product_id)
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
        if product.stock_qty < item.quantity {
            return Err(AppError::InsufficientStock {
                name: product.name.clone(),
                requested: item.quantity,
                available: product.stock_qty,
            });
        }

        lines.push(SnapshotLine {
            product_id: product.id,
            product_name: product.name.clone(),
            price_at_purchase: product.price,
            quantity: item.quantity,
        });
        locked_products.push(product);
    }

    let total_amount = pricing::order_total(&lines);

    // Delivery address is copied from the request, never linked back to the
    // user's stored address.
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(buyer.id),
        status: Set(OrderStatus::Pending),
        total_amount: Set(total_amount),
        delivery_street: Set(payload.delivery_street),
        delivery_city: Set(payload.delivery_city),
        delivery_state: Set(payload.delivery_state),
        delivery_pincode: Set(payload.delivery_pincode),
        payment_method: Set(Some(payload.payment_method)),
        payment_status: Set(PaymentStatus::Pending),
        placed_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut item_models = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            price_at_purchase: Set(line.price_at_purchase),
            quantity: Set(line.quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        item_models.push(item);
    }

    // Guarded decrement per line; a zero-row update (e.g. the same product
    // appearing twice draining the stock) aborts the transaction.
    for (line, product) in lines.iter().zip(&locked_products) {
        stock::reduce(&txn, product, line.quantity).await?;
    }

    // Ordering succeeded, so the cart has served its purpose. The cart row
    // itself stays.
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(buyer.id))
        .one(&txn)
        .await?
    {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    tracing::debug!(order_id = %order.id, user_id = %buyer.id, "order placed");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_place",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let resp = OrderResponse {
        id: order.id,
        user_id: buyer.id,
        user_name: buyer.full_name,
        status: order.status,
        payment_status: order.payment_status,
        payment_method: order.payment_method,
        total_amount: order.total_amount,
        delivery_street: order.delivery_street,
        delivery_city: order.delivery_city,
        delivery_state: order.delivery_state,
        delivery_pincode: order.delivery_pincode,
        items: item_models.into_iter().map(order_item_from_entity).collect(),
        placed_at: order.placed_at.with_timezone(&Utc),
        updated_at: order.updated_at.with_timezone(&Utc),
    };
    Ok(ApiResponse::success("Order placed", resp, Some(Meta::empty())))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    let order = find_order_for(&state.orm, user, id).await?;
    let resp = build_order_response(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", resp, Some(Meta::empty())))
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = parse_status_filter(query.status.as_deref())? {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::PlacedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::PlacedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_summary_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

/// Cancel an order that has not shipped yet and put every ordered quantity
/// back on the shelf, all in one transaction.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    let txn = state.orm.begin().await?;

    let order = find_order_for_locked(&txn, user, id).await?;
    let next = order.status.cancel()?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for item in &items {
        stock::add(&txn, item.product_id, item.quantity).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::debug!(order_id = %order.id, "order cancelled, stock restored");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let resp = build_order_response(&state.orm, order).await?;
    Ok(ApiResponse::success("Order cancelled", resp, Some(Meta::empty())))
}

/// Record payment for a pending order. Gateway integration is out of scope;
/// this trusts the reported transaction id and stores it 1:1 with the order.
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: PayOrderRequest,
) -> AppResult<ApiResponse<OrderResponse>> {
    let txn = state.orm.begin().await?;

    let order = find_order_for_locked(&txn, user, id).await?;

    if order.status == OrderStatus::Cancelled {
        return Err(AppError::InvalidStateTransition(
            "Cannot pay a cancelled order".into(),
        ));
    }
    if order.payment_status != PaymentStatus::Pending {
        return Err(AppError::BadRequest("Order already paid".into()));
    }
    let method = order
        .payment_method
        .ok_or_else(|| AppError::BadRequest("Order has no payment method".into()))?;

    let now = Utc::now();
    PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        transaction_id: Set(Some(payload.transaction_id)),
        amount: Set(order.total_amount),
        method: Set(method),
        status: Set(PaymentStatus::Success),
        gateway_response: Set(payload.gateway_response),
        paid_at: Set(Some(now.into())),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut active: OrderActive = order.into();
    active.payment_status = Set(PaymentStatus::Success);
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let resp = build_order_response(&state.orm, order).await?;
    Ok(ApiResponse::success("Payment recorded", resp, Some(Meta::empty())))
}

pub(crate) fn parse_status_filter(status: Option<&str>) -> AppResult<Option<OrderStatus>> {
    match status.filter(|s| !s.is_empty()) {
        Some(s) => OrderStatus::try_from_value(&s.to_string())
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Unknown order status '{s}'"))),
        None => Ok(None),
    }
}

async fn find_order_for<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<orders::Model> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if user.role != "admin" {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    Orders::find()
        .filter(condition)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".into()))
}

async fn find_order_for_locked<C: ConnectionTrait>(
    conn: &C,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<orders::Model> {
    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if user.role != "admin" {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    Orders::find()
        .filter(condition)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".into()))
}

pub(crate) async fn build_order_response<C: ConnectionTrait>(
    conn: &C,
    order: orders::Model,
) -> AppResult<OrderResponse> {
    let buyer = Users::find_by_id(order.user_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("User".into()))?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(OrderResponse {
        id: order.id,
        user_id: order.user_id,
        user_name: buyer.full_name,
        status: order.status,
        payment_status: order.payment_status,
        payment_method: order.payment_method,
        total_amount: order.total_amount,
        delivery_street: order.delivery_street,
        delivery_city: order.delivery_city,
        delivery_state: order.delivery_state,
        delivery_pincode: order.delivery_pincode,
        items,
        placed_at: order.placed_at.with_timezone(&Utc),
        updated_at: order.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn order_summary_from_entity(model: orders::Model) -> OrderSummary {
    OrderSummary {
        id: model.id,
        user_id: model.user_id,
        status: model.status,
        payment_status: model.payment_status,
        total_amount: model.total_amount,
        placed_at: model.placed_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn order_item_from_entity(model: crate::entity::order_items::Model) -> OrderItemResponse {
    let subtotal = pricing::line_subtotal(model.price_at_purchase, model.quantity);
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        product_name: model.product_name,
        price_at_purchase: model.price_at_purchase,
        quantity: model.quantity,
        subtotal,
    }
}
