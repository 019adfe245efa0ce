use axum::{Json, extract::State, http::StatusCode};
use chrono::{Duration, Utc};

use super::{ApiResult, required_text};
use crate::{
    AppState,
    auth::{
        self, AuthUser, generate_token, hash_password, validate_email, validate_password,
        validate_username, verify_password, verify_password_for_unknown_user,
    },
    error::{AppError, ErrorBody},
    mailer::{self, MailMessage},
    models::{
        EmailRequest, LoginRequest, NewUser, PasswordReset, RefreshRequest, RegisterRequest,
        ResetPasswordRequest, Role, TokenPair, User, UserProfile, VerifyEmailRequest,
    },
};

/// Signs an access token, persists a fresh refresh token and returns both.
pub(crate) async fn issue_token_pair(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let access_token = auth::issue_access_token(&state.config, user)?;
    let (refresh_token, record) = auth::issue_refresh_token(&state.config, user.id)?;
    state.repo.store_refresh_token(record).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl_secs,
    })
}

/// Sends a message, logging instead of failing the request when delivery fails.
pub(crate) async fn deliver(state: &AppState, message: MailMessage) {
    let to = message.to.clone();
    if let Err(e) = state.mailer.send(message).await {
        tracing::warn!(to = %to, error = %e, "failed to send email");
    }
}

/// register
///
/// [Public Route] Self-service signup. Creates an unverified `employee` and emails a
/// verification link. Unverified accounts are removed by the cleanup worker once
/// they outlive `UNVERIFIED_USER_TTL_HOURS`.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered, verification pending", body = UserProfile),
        (status = 400, description = "Invalid email, username or password", body = ErrorBody),
        (status = 409, description = "Email or username already in use", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let email = validate_email(&payload.email)?;
    let username = validate_username(&payload.username)?;
    let full_name = required_text("full_name", &payload.full_name)?;
    validate_password(&payload.password)?;

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("email already registered".to_string()));
    }
    if state.repo.find_user_by_login(&username).await?.is_some() {
        return Err(AppError::Conflict("username already taken".to_string()));
    }

    let token = generate_token();
    let user = state
        .repo
        .create_user(NewUser {
            email,
            username,
            full_name,
            password_hash: hash_password(&payload.password)?,
            role: Role::Employee,
            email_verified: false,
            verification_token: Some(token.clone()),
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    deliver(
        &state,
        mailer::verification_email(&user.email, &state.config.frontend_url, &token),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// login
///
/// [Public Route] Exchanges credentials for a token pair. `identifier` may be the
/// email or the username. Unknown users and wrong passwords both return 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Email not verified", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let identifier = payload.identifier.trim();
    let user = match state.repo.find_user_by_login(identifier).await? {
        Some(user) => verify_password(&payload.password, &user.password_hash).then_some(user),
        None => {
            verify_password_for_unknown_user(&payload.password);
            None
        }
    };

    let Some(user) = user else {
        tracing::warn!(identifier = %identifier, "failed login attempt");
        return Err(AppError::Unauthorized("invalid credentials".to_string()));
    };

    if !user.email_verified {
        return Err(AppError::Forbidden("email address not verified".to_string()));
    }

    let pair = issue_token_pair(&state, &user).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(pair))
}

/// refresh
///
/// [Public Route] Rotates a refresh token. The presented token is revoked and a new
/// pair is issued. Presenting a token that was already revoked is treated as theft:
/// every refresh token of that user is revoked.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated", body = TokenPair),
        (status = 401, description = "Invalid, expired or reused refresh token", body = ErrorBody)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = auth::decode_refresh_token(&state.config, &payload.refresh_token)?;

    let record = state
        .repo
        .get_refresh_token(claims.jti)
        .await?
        .filter(|record| record.user_id == claims.sub)
        .ok_or_else(|| AppError::Unauthorized("unknown refresh token".to_string()))?;

    if record.expires_at <= Utc::now() {
        return Err(AppError::Unauthorized("refresh token expired".to_string()));
    }

    // `revoke_refresh_token` is the single point of truth: if it reports nothing was
    // revoked, another request already used this token.
    if record.revoked || !state.repo.revoke_refresh_token(record.id).await? {
        let revoked = state.repo.revoke_user_refresh_tokens(record.user_id).await?;
        tracing::warn!(
            user_id = %record.user_id,
            revoked,
            "refresh token reuse detected, all sessions revoked"
        );
        return Err(AppError::Unauthorized("refresh token revoked".to_string()));
    }

    let user = state
        .repo
        .get_user(record.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

    Ok(Json(issue_token_pair(&state, &user).await?))
}

/// logout
///
/// [Authenticated Route] Revokes the given refresh token if it belongs to the caller.
/// Always answers 204 so logging out twice is harmless.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    request_body = RefreshRequest,
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    if let Ok(claims) = auth::decode_refresh_token(&state.config, &payload.refresh_token) {
        if claims.sub == id {
            state.repo.revoke_refresh_token(claims.jti).await?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// verify_email
///
/// [Public Route] Consumes a verification token and marks the account verified.
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Verified", body = UserProfile),
        (status = 404, description = "Unknown token", body = ErrorBody)
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<Json<UserProfile>> {
    let user = state
        .repo
        .verify_email(payload.token.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("verification token not found".to_string()))?;

    tracing::info!(user_id = %user.id, "email verified");
    Ok(Json(user.into()))
}

/// resend_verification
///
/// [Public Route] Issues a new verification token for an unverified account. Answers
/// 202 whether or not the address exists.
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    tag = "auth",
    request_body = EmailRequest,
    responses((status = 202, description = "Accepted"))
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> ApiResult<StatusCode> {
    let email = payload.email.trim().to_lowercase();
    if let Some(user) = state.repo.find_user_by_email(&email).await? {
        if !user.email_verified {
            let token = generate_token();
            if state.repo.set_verification_token(user.id, token.clone()).await? {
                deliver(
                    &state,
                    mailer::verification_email(&user.email, &state.config.frontend_url, &token),
                )
                .await;
            }
        }
    }
    Ok(StatusCode::ACCEPTED)
}

/// forgot_password
///
/// [Public Route] Emails a single-use reset token. Answers 202 whether or not the
/// address exists, so the endpoint cannot be used to enumerate accounts.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "auth",
    request_body = EmailRequest,
    responses((status = 202, description = "Accepted"))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> ApiResult<StatusCode> {
    let email = payload.email.trim().to_lowercase();
    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        tracing::debug!("password reset requested for unknown address");
        return Ok(StatusCode::ACCEPTED);
    };

    let now = Utc::now();
    let ttl_secs = state.config.password_reset_ttl_secs;
    let reset = PasswordReset {
        token: generate_token(),
        user_id: user.id,
        expires_at: now + Duration::seconds(ttl_secs),
        used: false,
        created_at: now,
    };
    let token = reset.token.clone();
    state.repo.create_password_reset(reset).await?;

    tracing::info!(user_id = %user.id, "password reset requested");
    deliver(
        &state,
        mailer::password_reset_email(&user.email, &state.config.frontend_url, &token, ttl_secs / 60),
    )
    .await;

    Ok(StatusCode::ACCEPTED)
}

/// reset_password
///
/// [Public Route] Sets a new password with a reset token. The token is consumed and
/// every refresh token of the user is revoked. The password is checked first so a
/// weak password does not burn the token.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Weak password or invalid, expired or used token", body = ErrorBody)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    validate_password(&payload.new_password)?;

    let user_id = state
        .repo
        .consume_password_reset(payload.token.trim(), Utc::now())
        .await?
        .ok_or_else(|| AppError::Validation("invalid or expired reset token".to_string()))?;

    state
        .repo
        .set_password(user_id, hash_password(&payload.new_password)?)
        .await?;
    state.repo.revoke_user_refresh_tokens(user_id).await?;

    tracing::info!(user_id = %user_id, "password reset completed");
    Ok(StatusCode::NO_CONTENT)
}
