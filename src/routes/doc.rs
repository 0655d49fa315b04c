use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UserResponse},
        cart::{AddToCartRequest, CartItemResponse, CartResponse, UpdateQuantityRequest},
        categories::{CategoryList, CategoryResponse, CreateCategoryRequest},
        orders::{
            CreateOrderRequest, OrderItemRequest, OrderItemResponse, OrderList, OrderResponse,
            OrderSummary, PayOrderRequest,
        },
        products::{
            CreateProductRequest, ProductList, ProductResponse, RestockRequest,
            UpdateProductRequest,
        },
    },
    entity::orders::{OrderStatus, PaymentMethod, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, categories, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::restock_product,
        categories::list_categories,
        categories::get_category,
        categories::list_category_products,
        categories::create_category,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_quantity,
        cart::remove_from_cart,
        cart::clear_cart,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::pay_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::confirm_order,
        admin::ship_order,
        admin::deliver_order
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UserResponse,
            CreateProductRequest,
            UpdateProductRequest,
            RestockRequest,
            ProductResponse,
            ProductList,
            CreateCategoryRequest,
            CategoryResponse,
            CategoryList,
            AddToCartRequest,
            UpdateQuantityRequest,
            CartItemResponse,
            CartResponse,
            OrderItemRequest,
            CreateOrderRequest,
            PayOrderRequest,
            OrderItemResponse,
            OrderResponse,
            OrderSummary,
            OrderList,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::CategoryQuery,
            Meta,
            ApiResponse<ProductResponse>,
            ApiResponse<ProductList>,
            ApiResponse<CategoryResponse>,
            ApiResponse<CategoryList>,
            ApiResponse<CartResponse>,
            ApiResponse<OrderResponse>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin order management endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
