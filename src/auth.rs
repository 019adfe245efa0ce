use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{RefreshTokenRecord, Role, User},
    repository::RepositoryState,
};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 254;
const OPAQUE_TOKEN_LENGTH: usize = 48;

/// Claims
///
/// Payload of an access token. Signed with `JWT_SECRET` and validated on every
/// authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user id.
    pub sub: Uuid,
    /// Role at issue time. Informational only; the extractor reloads the user.
    pub role: Role,
    /// Always `"access"`, so a refresh token is never accepted as an access token.
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

/// RefreshClaims
///
/// Payload of a refresh token, signed with `JWT_REFRESH_SECRET`. `jti` is the primary
/// key of the persisted `refresh_tokens` row.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

/// issue_access_token
///
/// Signs a short-lived access token for `user`.
pub fn issue_access_token(config: &AppConfig, user: &User) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        role: user.role,
        typ: ACCESS_TOKEN_TYPE.to_string(),
        iat: now,
        exp: now + config.access_token_ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))
}

/// issue_refresh_token
///
/// Signs a refresh token and returns the record the caller must persist before
/// handing the token out. A token whose `jti` is not stored is never accepted.
pub fn issue_refresh_token(
    config: &AppConfig,
    user_id: Uuid,
) -> Result<(String, RefreshTokenRecord), AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(config.refresh_token_ttl_secs);
    let record = RefreshTokenRecord {
        id: Uuid::new_v4(),
        user_id,
        expires_at,
        revoked: false,
        created_at: now,
    };
    let claims = RefreshClaims {
        sub: user_id,
        jti: record.id,
        typ: REFRESH_TOKEN_TYPE.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign refresh token: {e}")))?;

    Ok((token, record))
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

/// decode_access_token
///
/// Verifies signature, expiry and token type. Every failure is reported as 401.
pub fn decode_access_token(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation(),
    )
    .map_err(token_error)?;

    if data.claims.typ != ACCESS_TOKEN_TYPE {
        return Err(AppError::Unauthorized("invalid token type".to_string()));
    }
    Ok(data.claims)
}

/// decode_refresh_token
///
/// Same checks as `decode_access_token`, against the refresh secret.
pub fn decode_refresh_token(config: &AppConfig, token: &str) -> Result<RefreshClaims, AppError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
        &validation(),
    )
    .map_err(token_error)?;

    if data.claims.typ != REFRESH_TOKEN_TYPE {
        return Err(AppError::Unauthorized("invalid token type".to_string()));
    }
    Ok(data.claims)
}

fn token_error(err: jsonwebtoken::errors::Error) -> AppError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("token expired".to_string()),
        _ => AppError::Unauthorized("invalid token".to_string()),
    }
}

// --- Passwords ---

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

/// Verify a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// Verified against when a login names no account, so both paths pay one Argon2 check.
static DUMMY_PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("tecnicentro-placeholder-1").unwrap_or_default());

/// Runs a full verification against a placeholder hash and discards the result.
pub fn verify_password_for_unknown_user(password: &str) {
    std::hint::black_box(verify_password(password, &DUMMY_PASSWORD_HASH));
}

/// Enforces the password policy: at least 8 characters with a letter and a digit.
pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AppError::Validation(
            "password must contain at least one letter and one digit".to_string(),
        ));
    }
    Ok(())
}

/// validate_email
///
/// Structural check on an address, returning it trimmed and lowercased.
pub fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("email cannot be empty".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AppError::Validation(format!(
            "email cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::Validation("email must contain @".to_string()));
    };
    if local.is_empty() {
        return Err(AppError::Validation("email local part cannot be empty".to_string()));
    }
    if domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(AppError::Validation("email domain is invalid".to_string()));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("email cannot contain spaces".to_string()));
    }
    Ok(email)
}

/// Usernames are 3 to 32 characters of ASCII letters, digits, `.`, `_` or `-`.
pub fn validate_username(username: &str) -> Result<String, AppError> {
    let username = username.trim();
    let valid_len = (3..=32).contains(&username.len());
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid_len || !valid_chars {
        return Err(AppError::Validation(
            "username must be 3-32 characters of letters, digits, '.', '_' or '-'".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Random opaque token for email verification and password reset links.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

// --- Extractor ---

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers take it as an
/// argument; the role is the one currently stored, not the one in the token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Role guard for admin-only handlers.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing user
///    authenticates the request.
/// 2. Otherwise a `Bearer` access token is required and decoded.
/// 3. The user is reloaded from the repository, so deleted accounts are rejected and
///    role changes apply immediately.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(AppError::unauthorized)?;

        let claims = decode_access_token(&config, token)?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy() {
        assert!(validate_password("abc123").is_err());
        assert!(validate_password("abcdefgh").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("cambio2024").is_ok());
    }

    #[test]
    fn hash_round_trip_and_mismatch() {
        let hash = hash_password("cambio2024").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("cambio2024", &hash));
        assert!(!verify_password("cambio2025", &hash));
        assert!(!verify_password("cambio2024", "not-a-hash"));
    }

    #[test]
    fn unknown_user_check_uses_a_real_hash() {
        assert!(DUMMY_PASSWORD_HASH.starts_with("$argon2"));
        verify_password_for_unknown_user("cambio2024");
    }

    #[test]
    fn email_is_normalized_and_checked() {
        assert_eq!(
            validate_email("  Ana@TecnicentroJR.co ").unwrap(),
            "ana@tecnicentrojr.co"
        );
        assert!(validate_email("").is_err());
        assert!(validate_email("ana.tecnicentro.co").is_err());
        assert!(validate_email("@tecnicentro.co").is_err());
        assert!(validate_email("ana@").is_err());
        assert!(validate_email("ana@localhost").is_err());
    }

    #[test]
    fn username_rules() {
        assert_eq!(validate_username(" ana_r ").unwrap(), "ana_r");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("ana r").is_err());
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), OPAQUE_TOKEN_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn access_and_refresh_tokens_are_not_interchangeable() {
        let config = AppConfig::default();
        let user = User {
            id: Uuid::new_v4(),
            role: Role::Employee,
            ..Default::default()
        };

        let access = issue_access_token(&config, &user).unwrap();
        let (refresh, record) = issue_refresh_token(&config, user.id).unwrap();

        assert_eq!(decode_access_token(&config, &access).unwrap().sub, user.id);
        assert_eq!(decode_refresh_token(&config, &refresh).unwrap().jti, record.id);
        assert!(decode_access_token(&config, &refresh).is_err());
        assert!(decode_refresh_token(&config, &access).is_err());
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let config = AppConfig {
            access_token_ttl_secs: -10,
            ..AppConfig::default()
        };
        let token = issue_access_token(&config, &User::default()).unwrap();
        assert!(matches!(
            decode_access_token(&config, &token),
            Err(AppError::Unauthorized(msg)) if msg == "token expired"
        ));
    }
}
