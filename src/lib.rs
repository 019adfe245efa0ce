use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod bootstrap;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod receipt;
pub mod repository;
pub mod sales;
pub mod storage;

pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use mailer::{MailerState, MockMailer};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document built from the `#[utoipa::path]` handlers and `ToSchema` models,
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::logout, handlers::auth::verify_email,
        handlers::auth::resend_verification, handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::users::get_me, handlers::users::change_password, handlers::users::list_users,
        handlers::users::create_user, handlers::users::get_user, handlers::users::update_user,
        handlers::users::delete_user,
        handlers::clients::list_clients, handlers::clients::create_client,
        handlers::clients::get_client, handlers::clients::update_client,
        handlers::clients::delete_client,
        handlers::products::list_products, handlers::products::get_product,
        handlers::products::create_product, handlers::products::update_product,
        handlers::products::delete_product, handlers::products::request_product_image_upload,
        handlers::services::list_services, handlers::services::get_service,
        handlers::services::create_service, handlers::services::update_service,
        handlers::services::delete_service,
        handlers::orders::list_orders, handlers::orders::create_order,
        handlers::orders::get_order, handlers::orders::update_order_status,
        handlers::orders::get_receipt, handlers::orders::get_receipt_text,
        handlers::admin::get_admin_stats,
    ),
    components(
        schemas(
            error::ErrorBody,
            models::Role, models::OrderStatus, models::PaymentMethod, models::ItemKind,
            models::UserProfile, models::RegisterRequest, models::LoginRequest,
            models::TokenPair, models::RefreshRequest, models::VerifyEmailRequest,
            models::EmailRequest, models::ResetPasswordRequest, models::ChangePasswordRequest,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::Client, models::CreateClientRequest, models::UpdateClientRequest,
            models::Product, models::CreateProductRequest, models::UpdateProductRequest,
            models::ProductImageRequest, models::PresignedUrlResponse,
            models::Service, models::CreateServiceRequest, models::UpdateServiceRequest,
            models::Order, models::OrderItem, models::OrderDetail, models::OrderItemRequest,
            models::CreateOrderRequest, models::UpdateOrderStatusRequest,
            models::DashboardStats, receipt::Receipt, receipt::ReceiptLine,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and token lifecycle"),
        (name = "users", description = "Own account and staff management"),
        (name = "clients", description = "Workshop customers"),
        (name = "products", description = "Stocked catalog items"),
        (name = "services", description = "Workshop services"),
        (name = "orders", description = "Sales and receipts"),
        (name = "admin", description = "Dashboard statistics")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single immutable container shared by every request. Handlers pull the whole
/// state; extractors pull only the pieces they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with the extractor's 401 before any handler of the wrapped
/// router runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles all routes, applies authentication to the protected modules and wraps
/// everything in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One span per request carrying method, uri and the `x-request-id`, so every log
/// line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
