use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tecnicentro_api::{
    AppState,
    bootstrap::ensure_bootstrap_admin,
    cleanup::{self, CleanupConfig},
    config::{AppConfig, Env},
    create_router, mailer,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, persistence, storage and mail, starts the
/// cleanup worker and serves the API until a shutdown signal arrives.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    // 2. Logging: pretty locally, JSON in production for log aggregation.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tecnicentro_api=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Persistence: Postgres when DATABASE_URL is set, in-memory otherwise (local only).
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(db_url)
                .await?;
            let repo = PostgresRepository::new(pool);
            repo.migrate().await?;
            tracing::info!("database migrations applied");
            Arc::new(repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store (data is lost on exit)");
            Arc::new(MemoryRepository::new())
        }
    };

    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(&repo, admin).await?;
    }

    // 4. Object storage for product images.
    let s3_client = S3StorageClient::new(&config.s3);
    if config.env == Env::Local {
        // MinIO may not be running during local development; uploads fail later instead.
        if let Err(e) = s3_client.ensure_bucket_exists().await {
            tracing::warn!(error = %e, "could not provision the local storage bucket");
        }
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 5. Outgoing mail.
    let mailer = mailer::from_config(&config.mail);

    // 6. Background cleanup of unverified accounts.
    let cleanup_token = cleanup::start(
        repo.clone(),
        CleanupConfig {
            interval_secs: config.cleanup_interval_secs,
            unverified_ttl_hours: config.unverified_user_ttl_hours,
        },
    );

    // 7. Router and server.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        storage,
        mailer,
        config,
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup_token.cancel();
    tracing::info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
