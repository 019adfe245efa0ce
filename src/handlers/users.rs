use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{ApiResult, ListQuery, not_found, optional_required_text, required_text};
use crate::{
    AppState,
    auth::{AuthUser, hash_password, validate_email, validate_password, validate_username, verify_password},
    error::{AppError, ErrorBody},
    models::{
        ChangePasswordRequest, CreateUserRequest, NewUser, Role, UpdateUserRequest, UserProfile,
    },
};

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.repo.get_user(id).await?.ok_or_else(AppError::unauthorized)?;
    Ok(Json(user.into()))
}

/// change_password
///
/// [Authenticated Route] Changes the caller's password after re-checking the current
/// one. Other sessions are signed out.
#[utoipa::path(
    put,
    path = "/users/me/password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Weak new password", body = ErrorBody),
        (status = 401, description = "Wrong current password", body = ErrorBody)
    )
)]
pub async fn change_password(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = state.repo.get_user(id).await?.ok_or_else(AppError::unauthorized)?;

    if !verify_password(&payload.current_password, &user.password_hash) {
        return Err(AppError::Unauthorized("current password is incorrect".to_string()));
    }
    validate_password(&payload.new_password)?;

    state
        .repo
        .set_password(id, hash_password(&payload.new_password)?)
        .await?;
    state.repo.revoke_user_refresh_tokens(id).await?;

    tracing::info!(user_id = %id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// list_users
///
/// [Admin Route] All accounts, newest first.
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListQuery),
    responses(
        (status = 200, description = "Users", body = [UserProfile]),
        (status = 403, description = "Admin role required", body = ErrorBody)
    )
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    user.require_admin()?;
    let users = state.repo.list_users(&query.into()).await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// create_user
///
/// [Admin Route] Creates a staff account. Accounts created by an admin are verified
/// immediately and may be given any role.
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 409, description = "Email or username already in use", body = ErrorBody)
    )
)]
pub async fn create_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    user.require_admin()?;

    let email = validate_email(&payload.email)?;
    let username = validate_username(&payload.username)?;
    let full_name = required_text("full_name", &payload.full_name)?;
    validate_password(&payload.password)?;

    let created = state
        .repo
        .create_user(NewUser {
            email,
            username,
            full_name,
            password_hash: hash_password(&payload.password)?,
            role: payload.role,
            email_verified: true,
            verification_token: None,
        })
        .await?;

    tracing::info!(admin_id = %user.id, user_id = %created.id, role = %created.role, "user created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// get_user
///
/// [Admin Route] One account by id.
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserProfile>> {
    user.require_admin()?;
    let found = state.repo.get_user(id).await?.ok_or_else(|| not_found("user"))?;
    Ok(Json(found.into()))
}

/// update_user
///
/// [Admin Route] Changes name and/or role. The last remaining admin cannot be demoted.
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Would leave no admin", body = ErrorBody)
    )
)]
pub async fn update_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    user.require_admin()?;

    let target = state.repo.get_user(id).await?.ok_or_else(|| not_found("user"))?;
    if target.role == Role::Admin
        && payload.role == Some(Role::Employee)
        && state.repo.count_admins().await? <= 1
    {
        return Err(AppError::Conflict("cannot demote the last admin".to_string()));
    }

    let update = UpdateUserRequest {
        full_name: optional_required_text("full_name", payload.full_name)?,
        role: payload.role,
    };
    let updated = state
        .repo
        .update_user(id, update)
        .await?
        .ok_or_else(|| not_found("user"))?;

    Ok(Json(updated.into()))
}

/// delete_user
///
/// [Admin Route] Removes an account. Admins cannot delete themselves, and users that
/// registered sales cannot be deleted (409).
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Self-deletion or user still referenced", body = ErrorBody)
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    user.require_admin()?;

    if id == user.id {
        return Err(AppError::Conflict("you cannot delete your own account".to_string()));
    }
    if !state.repo.delete_user(id).await? {
        return Err(not_found("user"));
    }

    tracing::info!(admin_id = %user.id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
