use crate::{
    auth::{hash_password, validate_email, validate_password},
    config::BootstrapAdmin,
    error::AppError,
    models::{NewUser, Role},
    repository::RepositoryState,
};

const BOOTSTRAP_USERNAME: &str = "admin";

/// ensure_bootstrap_admin
///
/// Creates the first administrator from `ADMIN_EMAIL`/`ADMIN_PASSWORD` when the
/// database has no admin yet. Returns whether an account was created. A fresh install
/// otherwise has no way to reach the admin-only user endpoints.
pub async fn ensure_bootstrap_admin(
    repo: &RepositoryState,
    admin: &BootstrapAdmin,
) -> Result<bool, AppError> {
    if repo.count_admins().await? > 0 {
        return Ok(false);
    }

    let email = validate_email(&admin.email)?;
    validate_password(&admin.password)?;

    let user = repo
        .create_user(NewUser {
            email,
            username: BOOTSTRAP_USERNAME.to_string(),
            full_name: "Administrator".to_string(),
            password_hash: hash_password(&admin.password)?,
            role: Role::Admin,
            email_verified: true,
            verification_token: None,
        })
        .await?;

    tracing::info!(user_id = %user.id, "bootstrap admin created");
    Ok(true)
}
