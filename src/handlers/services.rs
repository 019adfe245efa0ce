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
    models::{CreateServiceRequest, Service, UpdateServiceRequest},
};

fn positive_duration(minutes: Option<i32>) -> ApiResult<()> {
    match minutes {
        Some(m) if m <= 0 => Err(AppError::Validation(
            "duration_minutes must be positive".to_string(),
        )),
        _ => Ok(()),
    }
}

#[utoipa::path(
    get,
    path = "/services",
    tag = "services",
    params(ListQuery),
    responses((status = 200, description = "Services", body = [Service]))
)]
pub async fn list_services(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.repo.list_services(&query.into()).await?))
}

#[utoipa::path(
    get,
    path = "/services/{id}",
    tag = "services",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses(
        (status = 200, description = "Found", body = Service),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_service(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Service>> {
    let service = state.repo.get_service(id).await?.ok_or_else(|| not_found("service"))?;
    Ok(Json(service))
}

/// create_service
///
/// [Admin Route] Adds a workshop service. Names are unique.
#[utoipa::path(
    post,
    path = "/services",
    tag = "services",
    request_body = CreateServiceRequest,
    responses(
        (status = 201, description = "Created", body = Service),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 409, description = "Name already exists", body = ErrorBody)
    )
)]
pub async fn create_service(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateServiceRequest>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    user.require_admin()?;
    non_negative("price", payload.price)?;
    positive_duration(payload.duration_minutes)?;

    let request = CreateServiceRequest {
        name: required_text("name", &payload.name)?,
        description: blank_to_none(payload.description),
        ..payload
    };
    let service = state.repo.create_service(request).await?;

    tracing::info!(service_id = %service.id, "service created");
    Ok((StatusCode::CREATED, Json(service)))
}

#[utoipa::path(
    put,
    path = "/services/{id}",
    tag = "services",
    params(("id" = Uuid, Path, description = "Service ID")),
    request_body = UpdateServiceRequest,
    responses(
        (status = 200, description = "Updated", body = Service),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Name already exists", body = ErrorBody)
    )
)]
pub async fn update_service(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServiceRequest>,
) -> ApiResult<Json<Service>> {
    user.require_admin()?;
    if let Some(price) = payload.price {
        non_negative("price", price)?;
    }
    positive_duration(payload.duration_minutes)?;

    let update = UpdateServiceRequest {
        name: optional_required_text("name", payload.name)?,
        description: blank_to_none(payload.description),
        ..payload
    };
    let service = state
        .repo
        .update_service(id, update)
        .await?
        .ok_or_else(|| not_found("service"))?;
    Ok(Json(service))
}

/// delete_service
///
/// [Admin Route] Services that appear on a sale cannot be deleted (409).
#[utoipa::path(
    delete,
    path = "/services/{id}",
    tag = "services",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Service is referenced by orders", body = ErrorBody)
    )
)]
pub async fn delete_service(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    if !state.repo.delete_service(id).await? {
        return Err(not_found("service"));
    }
    Ok(StatusCode::NO_CONTENT)
}
