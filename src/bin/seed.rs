use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use rust_decimal::Decimal;
use shopnest_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&pool, "admin@shopnest.dev", "Store Admin", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "user@shopnest.dev", "Demo Shopper", "user123", "user").await?;
    let electronics = ensure_category(&pool, "Electronics", "electronics", None).await?;
    let audio = ensure_category(&pool, "Audio", "audio", Some(electronics)).await?;
    let books = ensure_category(&pool, "Books", "books", None).await?;
    seed_products(&pool, admin_id, &[(audio, "audio"), (books, "books")]).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    full_name: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    slug: &str,
    parent_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, slug, parent_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (slug) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .bind(parent_id)
    .fetch_optional(pool)
    .await?;

    let category_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM categories WHERE slug = $1")
                .bind(slug)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured category {slug}");
    Ok(category_id)
}

async fn seed_products(
    pool: &sqlx::PgPool,
    seller_id: Uuid,
    categories: &[(Uuid, &str)],
) -> anyhow::Result<()> {
    let category_for = |slug: &str| {
        categories
            .iter()
            .find(|(_, s)| *s == slug)
            .map(|(id, _)| *id)
    };

    // Prices in cents to keep the literals exact.
    let products = vec![
        ("Wireless Headphones", "Over-ear, 30h battery", 12500_i64, 40, "audio"),
        ("Bluetooth Speaker", "Portable, water resistant", 5999, 60, "audio"),
        ("Async Rust in Practice", "Patterns for production services", 4250, 120, "books"),
        ("The Ferris Cookbook", "Recipes for systems programmers", 2999, 85, "books"),
    ];

    for (name, desc, cents, stock, slug) in products {
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            continue;
        }

        let category_id = category_for(slug)
            .ok_or_else(|| anyhow::anyhow!("unknown category slug: {slug}"))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock_qty, category_id, seller_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(Decimal::new(cents, 2))
        .bind(stock)
        .bind(category_id)
        .bind(seller_id)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
