use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::products::{self, Column as ProdCol, Entity as Products},
    error::{AppError, AppResult},
};

/// Decrement a product's stock inside the caller's transaction.
///
/// The UPDATE is conditional on `stock_qty >= quantity`, so a concurrent
/// writer that drained the stock between our read and this write makes the
/// statement touch zero rows instead of driving the count negative. Zero
/// rows is reported as insufficient stock and must abort the caller's
/// transaction.
pub async fn reduce<C: ConnectionTrait>(
    conn: &C,
    product: &products::Model,
    quantity: i32,
) -> AppResult<()> {
    if quantity > product.stock_qty {
        return Err(AppError::InsufficientStock {
            name: product.name.clone(),
            requested: quantity,
            available: product.stock_qty,
        });
    }

    let result = Products::update_many()
        .col_expr(
            ProdCol::StockQty,
            Expr::col(ProdCol::StockQty).sub(quantity),
        )
        .filter(
            Condition::all()
                .add(ProdCol::Id.eq(product.id))
                .add(ProdCol::StockQty.gte(quantity)),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::InsufficientStock {
            name: product.name.clone(),
            requested: quantity,
            available: product.stock_qty,
        });
    }

    Ok(())
}

/// Increment a product's stock inside the caller's transaction.
/// Unconditional; used by restock and by order cancellation.
pub async fn add<C: ConnectionTrait>(conn: &C, product_id: Uuid, quantity: i32) -> AppResult<()> {
    Products::update_many()
        .col_expr(
            ProdCol::StockQty,
            Expr::col(ProdCol::StockQty).add(quantity),
        )
        .filter(ProdCol::Id.eq(product_id))
        .exec(conn)
        .await?;

    Ok(())
}
