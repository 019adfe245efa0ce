use std::{sync::Arc, time::Duration};
use tecnicentro_api::{
    MemoryRepository, RepositoryState,
    bootstrap::ensure_bootstrap_admin,
    cleanup::{self, CleanupConfig, sweep_unverified_users},
    config::BootstrapAdmin,
    models::{NewUser, Role},
};

async fn seed(repo: &RepositoryState, username: &str, verified: bool) -> uuid::Uuid {
    repo.create_user(NewUser {
        email: format!("{username}@tecnicentrojr.co"),
        username: username.to_string(),
        full_name: username.to_string(),
        password_hash: "hash".to_string(),
        role: Role::Employee,
        email_verified: verified,
        verification_token: (!verified).then(|| format!("token-{username}")),
    })
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn test_sweep_removes_only_stale_unverified_users() {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let pending = seed(&repo, "pendiente", false).await;
    let verified = seed(&repo, "verificado", true).await;

    // Nothing is older than a day yet.
    assert_eq!(sweep_unverified_users(&repo, 24).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(sweep_unverified_users(&repo, 0).await.unwrap(), 1);

    assert!(repo.get_user(pending).await.unwrap().is_none());
    assert!(repo.get_user(verified).await.unwrap().is_some());
}

#[tokio::test]
async fn test_worker_sweeps_at_start_and_stops_on_cancel() {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let pending = seed(&repo, "pendiente", false).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let token = cleanup::start(
        repo.clone(),
        CleanupConfig {
            interval_secs: 3600,
            unverified_ttl_hours: 0,
        },
    );

    let mut removed = false;
    for _ in 0..50 {
        if repo.get_user(pending).await.unwrap().is_none() {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    token.cancel();

    assert!(removed, "first sweep runs immediately");
}

#[tokio::test]
async fn test_bootstrap_admin_created_once() {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let admin = BootstrapAdmin {
        email: "Dueno@TecnicentroJR.co".to_string(),
        password: "arranque2024".to_string(),
    };

    assert!(ensure_bootstrap_admin(&repo, &admin).await.unwrap());
    assert!(!ensure_bootstrap_admin(&repo, &admin).await.unwrap());
    assert_eq!(repo.count_admins().await.unwrap(), 1);

    let user = repo.find_user_by_login("admin").await.unwrap().unwrap();
    assert_eq!(user.email, "dueno@tecnicentrojr.co");
    assert!(user.email_verified);
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn test_bootstrap_admin_rejects_weak_password() {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let admin = BootstrapAdmin {
        email: "dueno@tecnicentrojr.co".to_string(),
        password: "admin".to_string(),
    };

    assert!(ensure_bootstrap_admin(&repo, &admin).await.is_err());
    assert_eq!(repo.count_admins().await.unwrap(), 0);
}
