use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use shopnest_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::AddToCartRequest,
        orders::{CreateOrderRequest, OrderItemRequest, PayOrderRequest},
    },
    entity::{
        categories::ActiveModel as CategoryActive,
        orders::{OrderStatus, PaymentMethod, PaymentStatus},
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::{OrderListQuery, Pagination},
    services::{admin_service, cart_service, order_service},
    state::AppState,
};
use uuid::Uuid;

// Each test seeds its own users and products, so the suite can run in
// parallel against one database without tests trampling each other.

#[tokio::test]
async fn place_order_snapshots_prices_and_reduces_stock() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let category = create_category(&state).await?;
    let hoodie = create_product(&state, "Hoodie", 5000, 10, category).await?;
    let mug = create_product(&state, "Mug", 7500, 5, category).await?;

    let resp = order_service::place_order(
        &state,
        &buyer,
        order_request(vec![(hoodie.id, 2), (mug.id, 2)]),
    )
    .await?;
    let order = resp.data.unwrap();

    // 2 x 50.00 + 2 x 75.00
    assert_eq!(order.total_amount, Decimal::new(25000, 2));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.items.len(), 2);

    let hoodie_after = Products::find_by_id(hoodie.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(hoodie_after.stock_qty, 8);
    let mug_after = Products::find_by_id(mug.id).one(&state.orm).await?.unwrap();
    assert_eq!(mug_after.stock_qty, 3);

    // Raising the catalog price afterwards must not touch the frozen lines.
    let mut edit: ProductActive = hoodie_after.into();
    edit.price = Set(Decimal::new(9900, 2));
    edit.update(&state.orm).await?;

    let fetched = order_service::get_order(&state, &buyer, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.total_amount, Decimal::new(25000, 2));
    let line = fetched
        .items
        .iter()
        .find(|i| i.product_id == hoodie.id)
        .unwrap();
    assert_eq!(line.price_at_purchase, Decimal::new(5000, 2));
    assert_eq!(line.subtotal, Decimal::new(10000, 2));

    Ok(())
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let category = create_category(&state).await?;
    let plenty = create_product(&state, "Plenty", 1000, 10, category).await?;
    let scarce = create_product(&state, "Scarce", 2000, 1, category).await?;

    let err = order_service::place_order(
        &state,
        &buyer,
        order_request(vec![(plenty.id, 2), (scarce.id, 5)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    // The first line must not have been applied.
    let plenty_after = Products::find_by_id(plenty.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(plenty_after.stock_qty, 10);
    let scarce_after = Products::find_by_id(scarce.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(scarce_after.stock_qty, 1);

    let orders = order_service::list_my_orders(
        &state,
        &buyer,
        OrderListQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            status: None,
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert!(orders.items.is_empty());

    Ok(())
}

#[tokio::test]
async fn cancelling_restores_stock_but_shipped_orders_stay() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let category = create_category(&state).await?;
    let widget = create_product(&state, "Widget", 1500, 10, category).await?;

    // Cancel before shipping puts the units back.
    let order = order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 3)]))
        .await?
        .data
        .unwrap();
    let cancelled = order_service::cancel_order(&state, &buyer, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let widget_after = Products::find_by_id(widget.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(widget_after.stock_qty, 10);

    // Once shipped, cancellation is refused and stock stays reduced.
    let order = order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 2)]))
        .await?
        .data
        .unwrap();
    admin_service::confirm_order(&state, &admin, order.id).await?;
    admin_service::ship_order(&state, &admin, order.id).await?;

    let err = order_service::cancel_order(&state, &buyer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    let widget_after = Products::find_by_id(widget.id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(widget_after.stock_qty, 8);

    Ok(())
}

#[tokio::test]
async fn order_lifecycle_rejects_repeated_and_skipped_steps() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let admin = create_user(&state, "admin").await?;
    let category = create_category(&state).await?;
    let widget = create_product(&state, "Gadget", 1200, 10, category).await?;

    let order = order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 1)]))
        .await?
        .data
        .unwrap();

    // Delivering a pending order skips two states.
    let err = admin_service::deliver_order(&state, &admin, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let confirmed = admin_service::confirm_order(&state, &admin, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    let err = admin_service::confirm_order(&state, &admin, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    admin_service::ship_order(&state, &admin, order.id).await?;
    let delivered = admin_service::deliver_order(&state, &admin, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);

    Ok(())
}

#[tokio::test]
async fn cart_merges_lines_and_rejects_overdraw() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let category = create_category(&state).await?;
    let widget = create_product(&state, "Limited", 2500, 8, category).await?;

    let add = |qty| AddToCartRequest {
        product_id: widget.id,
        quantity: qty,
    };

    cart_service::add_to_cart(&state, &buyer, add(4)).await?;
    let cart = cart_service::add_to_cart(&state, &buyer, add(4))
        .await?
        .data
        .unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 8);

    // A further add would take the merged line past available stock; the
    // existing line must stay untouched.
    let err = cart_service::add_to_cart(&state, &buyer, add(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    let cart = cart_service::get_cart(&state, &buyer).await?.data.unwrap();
    assert_eq!(cart.items[0].quantity, 8);
    assert_eq!(cart.total_price, Decimal::new(20000, 2));

    Ok(())
}

#[tokio::test]
async fn placing_an_order_empties_the_cart() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let category = create_category(&state).await?;
    let widget = create_product(&state, "CartItem", 3000, 10, category).await?;

    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: widget.id,
            quantity: 2,
        },
    )
    .await?;

    order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 2)])).await?;

    let cart = cart_service::get_cart(&state, &buyer).await?.data.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.total_items, 0);

    Ok(())
}

#[tokio::test]
async fn paying_twice_or_after_cancellation_is_refused() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let buyer = create_user(&state, "user").await?;
    let category = create_category(&state).await?;
    let widget = create_product(&state, "Payable", 4000, 10, category).await?;

    let order = order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 1)]))
        .await?
        .data
        .unwrap();

    let paid = order_service::pay_order(
        &state,
        &buyer,
        order.id,
        PayOrderRequest {
            transaction_id: Uuid::new_v4().to_string(),
            gateway_response: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Success);

    let err = order_service::pay_order(
        &state,
        &buyer,
        order.id,
        PayOrderRequest {
            transaction_id: Uuid::new_v4().to_string(),
            gateway_response: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let cancelled = order_service::place_order(&state, &buyer, order_request(vec![(widget.id, 1)]))
        .await?
        .data
        .unwrap();
    order_service::cancel_order(&state, &buyer, cancelled.id).await?;
    let err = order_service::pay_order(
        &state,
        &buyer,
        cancelled.id,
        PayOrderRequest {
            transaction_id: Uuid::new_v4().to_string(),
            gateway_response: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    Ok(())
}

/// Connect and migrate, or skip the test when no database is configured.
async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    Ok(Some(AppState { pool, orm }))
}

async fn create_user(state: &AppState, role: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(format!("{role}-{}@example.com", Uuid::new_v4())),
        password_hash: Set("dummy".into()),
        full_name: Set("Test User".into()),
        role: Set(role.into()),
        active: NotSet,
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role: role.into(),
    })
}

async fn create_category(state: &AppState) -> anyhow::Result<Uuid> {
    let suffix = Uuid::new_v4();
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Test Category {suffix}")),
        slug: Set(format!("test-category-{suffix}")),
        description: NotSet,
        parent_id: NotSet,
        active: NotSet,
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(category.id)
}

async fn create_product(
    state: &AppState,
    name: &str,
    price_cents: i64,
    stock_qty: i32,
    category_id: Uuid,
) -> anyhow::Result<shopnest_api::entity::products::Model> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.into()),
        description: Set(Some("A product for testing".into())),
        price: Set(Decimal::new(price_cents, 2)),
        stock_qty: Set(stock_qty),
        brand: NotSet,
        active: NotSet,
        category_id: Set(category_id),
        seller_id: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product)
}

fn order_request(items: Vec<(Uuid, i32)>) -> CreateOrderRequest {
    CreateOrderRequest {
        delivery_street: "1 Test Street".into(),
        delivery_city: "Testville".into(),
        delivery_state: "TS".into(),
        delivery_pincode: "560001".into(),
        payment_method: PaymentMethod::Cod,
        items: items
            .into_iter()
            .map(|(product_id, quantity)| OrderItemRequest {
                product_id,
                quantity,
            })
            .collect(),
    }
}
