use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{ApiResult, ListQuery, blank_to_none, not_found, optional_required_text, required_text};
use crate::{
    AppState,
    auth::{AuthUser, validate_email},
    error::ErrorBody,
    models::{Client, CreateClientRequest, UpdateClientRequest},
};

fn clean_email(email: Option<String>) -> ApiResult<Option<String>> {
    blank_to_none(email).map(|e| validate_email(&e)).transpose()
}

/// list_clients
///
/// [Authenticated Route] Clients ordered by name. `search` matches document number,
/// name and email.
#[utoipa::path(
    get,
    path = "/clients",
    tag = "clients",
    params(ListQuery),
    responses((status = 200, description = "Clients", body = [Client]))
)]
pub async fn list_clients(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Client>>> {
    Ok(Json(state.repo.list_clients(&query.into()).await?))
}

/// create_client
///
/// [Authenticated Route] Registers a client. Document numbers are unique.
#[utoipa::path(
    post,
    path = "/clients",
    tag = "clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Created", body = Client),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Document number already registered", body = ErrorBody)
    )
)]
pub async fn create_client(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateClientRequest>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let request = CreateClientRequest {
        document_number: required_text("document_number", &payload.document_number)?,
        full_name: required_text("full_name", &payload.full_name)?,
        email: clean_email(payload.email)?,
        phone: blank_to_none(payload.phone),
        address: blank_to_none(payload.address),
    };
    let client = state.repo.create_client(request).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

#[utoipa::path(
    get,
    path = "/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Found", body = Client),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_client(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Client>> {
    let client = state.repo.get_client(id).await?.ok_or_else(|| not_found("client"))?;
    Ok(Json(client))
}

/// update_client
///
/// [Authenticated Route] Partial update; absent fields are left untouched.
#[utoipa::path(
    put,
    path = "/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    request_body = UpdateClientRequest,
    responses(
        (status = 200, description = "Updated", body = Client),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Document number already registered", body = ErrorBody)
    )
)]
pub async fn update_client(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> ApiResult<Json<Client>> {
    let update = UpdateClientRequest {
        document_number: optional_required_text("document_number", payload.document_number)?,
        full_name: optional_required_text("full_name", payload.full_name)?,
        email: clean_email(payload.email)?,
        phone: blank_to_none(payload.phone),
        address: blank_to_none(payload.address),
    };
    let client = state
        .repo
        .update_client(id, update)
        .await?
        .ok_or_else(|| not_found("client"))?;
    Ok(Json(client))
}

/// delete_client
///
/// [Admin Route] Clients with sales on record cannot be deleted (409).
#[utoipa::path(
    delete,
    path = "/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Client has orders", body = ErrorBody)
    )
)]
pub async fn delete_client(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;
    if !state.repo.delete_client(id).await? {
        return Err(not_found("client"));
    }
    Ok(StatusCode::NO_CONTENT)
}
