use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderResponse},
    entity::orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::order_service::{build_order_response, order_summary_from_entity, parse_status_filter},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
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

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".into()))?;
    let resp = build_order_response(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", resp, Some(Meta::empty())))
}

pub async fn confirm_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    transition_order(state, user, id, "order_confirm", OrderStatus::confirm).await
}

pub async fn ship_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    transition_order(state, user, id, "order_ship", OrderStatus::ship).await
}

pub async fn deliver_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderResponse>> {
    transition_order(state, user, id, "order_deliver", OrderStatus::deliver).await
}

/// Apply one lifecycle step under a row lock. The transition function is the
/// single authority on what is allowed; everything else here is plumbing.
/// None of these steps touch stock, only cancellation does.
async fn transition_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    action: &str,
    transition: fn(OrderStatus) -> Result<OrderStatus, AppError>,
) -> AppResult<ApiResponse<OrderResponse>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".into()))?;

    let next = transition(order.status)?;

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::debug!(order_id = %order.id, status = %order.status, "order status updated");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        action,
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status.to_string() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let resp = build_order_response(&state.orm, order).await?;
    Ok(ApiResponse::success("Order updated", resp, Some(Meta::empty())))
}
