use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{
    ApiResult, ListQuery, blank_to_none, non_negative, not_found, optional_required_text,
    required_text,
};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorBody},
    models::{
        CreateProductRequest, PresignedUrlResponse, Product, ProductImageRequest,
        UpdateProductRequest,
    },
    storage::product_image_key,
};

/// list_products
///
/// [Authenticated Route] Catalog products ordered by name. `search` matches SKU and name.
#[utoipa::path(
    get,
    path = "/products",
    tag = "products",
    params(ListQuery),
    responses((status = 200, description = "Products", body = [Product]))
)]
pub async fn list_products(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.repo.list_products(&query.into()).await?))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Found", body = Product),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_product(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    let product = state.repo.get_product(id).await?.ok_or_else(|| not_found("product"))?;
    Ok(Json(product))
}

/// create_product
///
/// [Admin Route] Adds a product to the catalog. SKUs are unique.
#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Created", body = Product),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 409, description = "SKU already exists", body = ErrorBody)
    )
)]
pub async fn create_product(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    user.require_admin()?;
    non_negative("price", payload.price)?;
    non_negative("stock", i64::from(payload.stock))?;

    let request = CreateProductRequest {
        sku: required_text("sku", &payload.sku)?,
        name: required_text("name", &payload.name)?,
        description: blank_to_none(payload.description),
        ..payload
    };
    let product = state.repo.create_product(request).await?;

    tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// update_product
///
/// [Admin Route] Partial update. Setting `stock` directly is how inventory is adjusted.
#[utoipa::path(
    put,
    path = "/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated", body = Product),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "SKU already exists", body = ErrorBody)
    )
)]
pub async fn update_product(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    user.require_admin()?;
    if let Some(price) = payload.price {
        non_negative("price", price)?;
    }
    if let Some(stock) = payload.stock {
        non_negative("stock", i64::from(stock))?;
    }

    let update = UpdateProductRequest {
        sku: optional_required_text("sku", payload.sku)?,
        name: optional_required_text("name", payload.name)?,
        description: blank_to_none(payload.description),
        ..payload
    };
    let product = state
        .repo
        .update_product(id, update)
        .await?
        .ok_or_else(|| not_found("product"))?;
    Ok(Json(product))
}

/// delete_product
///
/// [Admin Route] Products that appear on a sale cannot be deleted (409); deactivate
/// them instead.
#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Product is referenced by orders", body = ErrorBody)
    )
)]
pub async fn delete_product(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    if !state.repo.delete_product(id).await? {
        return Err(not_found("product"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// request_product_image_upload
///
/// [Admin Route] Returns a presigned PUT URL for the product image and records the
/// object key on the product. The URL lives 10 minutes and only accepts the declared
/// `image/*` content type.
#[utoipa::path(
    post,
    path = "/products/{id}/image",
    tag = "products",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = ProductImageRequest,
    responses(
        (status = 200, description = "Upload URL", body = PresignedUrlResponse),
        (status = 400, description = "Not an image content type", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn request_product_image_upload(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductImageRequest>,
) -> ApiResult<Json<PresignedUrlResponse>> {
    user.require_admin()?;

    let content_type = payload.content_type.trim().to_ascii_lowercase();
    if !content_type.starts_with("image/") || content_type.len() <= "image/".len() {
        return Err(AppError::Validation(
            "content_type must be an image/* type".to_string(),
        ));
    }

    if state.repo.get_product(id).await?.is_none() {
        return Err(not_found("product"));
    }

    let key = product_image_key(id, &payload.filename);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &content_type)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    state
        .repo
        .set_product_image(id, key.clone())
        .await?
        .ok_or_else(|| not_found("product"))?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: key,
    }))
}
