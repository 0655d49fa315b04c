use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::categories::{CategoryList, CategoryResponse, CreateCategoryRequest},
    entity::categories::{ActiveModel as CategoryActive, Column as CatCol, Entity as Categories, Model as CategoryModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// List categories, optionally one level of the tree at a time:
/// no `parent_id` returns the roots, a `parent_id` returns its children.
pub async fn list_categories(
    state: &AppState,
    parent_id: Option<Uuid>,
) -> AppResult<ApiResponse<CategoryList>> {
    let condition = match parent_id {
        Some(parent) => Condition::all().add(CatCol::ParentId.eq(parent)),
        None => Condition::all().add(CatCol::ParentId.is_null()),
    };

    let items = Categories::find()
        .filter(condition)
        .order_by_asc(CatCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(category_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_category_by_slug(
    state: &AppState,
    slug: &str,
) -> AppResult<ApiResponse<CategoryResponse>> {
    let category = Categories::find()
        .filter(CatCol::Slug.eq(slug))
        .one(&state.orm)
        .await?;
    let category = match category {
        Some(c) => c,
        None => return Err(AppError::NotFound("Category".into())),
    };
    Ok(ApiResponse::success(
        "Category",
        category_from_entity(category),
        None,
    ))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<CategoryResponse>> {
    ensure_admin(user)?;

    let duplicate = Categories::find()
        .filter(
            Condition::any()
                .add(CatCol::Name.eq(payload.name.as_str()))
                .add(CatCol::Slug.eq(payload.slug.as_str())),
        )
        .one(&state.orm)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::BadRequest(
            "Category name or slug already exists".into(),
        ));
    }

    // A fresh id cannot appear in its own ancestor chain, so resolving the
    // parent is the only cycle guard creation needs.
    if let Some(parent_id) = payload.parent_id {
        let parent = Categories::find_by_id(parent_id).one(&state.orm).await?;
        if parent.is_none() {
            return Err(AppError::NotFound("Category".into()));
        }
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(payload.slug),
        description: Set(payload.description),
        parent_id: Set(payload.parent_id),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

fn category_from_entity(model: CategoryModel) -> CategoryResponse {
    CategoryResponse {
        id: model.id,
        name: model.name,
        slug: model.slug,
        description: model.description,
        parent_id: model.parent_id,
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
