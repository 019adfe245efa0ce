use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{
        Client, CreateClientRequest, CreateProductRequest, CreateServiceRequest, DashboardStats,
        ItemKind, NewOrder, NewUser, Order, OrderDetail, OrderItem, OrderItemRequest, OrderStatus,
        PasswordReset, Product, RefreshTokenRecord, Service, UpdateClientRequest,
        UpdateProductRequest, UpdateServiceRequest, UpdateUserRequest, User,
    },
    sales,
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Persistence failures, already classified so handlers can map them to HTTP statuses.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 unique_violation, 23503 foreign_key_violation, 23001 restrict_violation
            match db_err.code().as_deref() {
                Some("23505") => {
                    return Self::Conflict(format!(
                        "duplicate value violates {}",
                        db_err.constraint().unwrap_or("a unique constraint")
                    ));
                }
                Some("23503" | "23001") => {
                    return Self::Conflict(format!(
                        "record is still referenced ({})",
                        db_err.constraint().unwrap_or("foreign key")
                    ));
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Pagination
///
/// Normalized paging window shared by all list queries. `page` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 100;

    /// Clamps raw query values to sane bounds.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            per_page: per_page.unwrap_or(20).clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Search + paging for catalog, client and user listings.
#[derive(Clone, Debug, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub pagination: Pagination,
}

/// Filters for `list_orders`.
#[derive(Clone, Debug, Default)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub client_id: Option<Uuid>,
    pub pagination: Pagination,
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this trait,
/// so the Postgres store and the in-memory store are interchangeable.
///
/// Methods returning `Option`/`bool` treat "row absent" as a normal outcome; every
/// other failure is a `RepositoryError`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    // Case-insensitive match on email, exact match on username.
    async fn find_user_by_login(&self, identifier: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self, params: &ListParams) -> RepoResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>>;
    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool>;
    async fn set_verification_token(&self, id: Uuid, token: String) -> RepoResult<bool>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;
    async fn count_admins(&self) -> RepoResult<i64>;
    /// Marks the owner of `token` verified and clears the token.
    async fn verify_email(&self, token: &str) -> RepoResult<Option<User>>;
    /// Deletes unverified users created before `cutoff`. Returns how many were removed.
    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64>;

    // --- Refresh tokens ---
    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()>;
    async fn get_refresh_token(&self, id: Uuid) -> RepoResult<Option<RefreshTokenRecord>>;
    /// Revokes one token. Returns false if it was unknown or already revoked.
    async fn revoke_refresh_token(&self, id: Uuid) -> RepoResult<bool>;
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> RepoResult<u64>;

    // --- Password resets ---
    async fn create_password_reset(&self, reset: PasswordReset) -> RepoResult<()>;
    /// Marks the token used if it exists, is unused and has not expired at `now`.
    /// Returns the owning user id on success.
    async fn consume_password_reset(&self, token: &str, now: DateTime<Utc>)
    -> RepoResult<Option<Uuid>>;

    // --- Clients ---
    async fn create_client(&self, req: CreateClientRequest) -> RepoResult<Client>;
    async fn get_client(&self, id: Uuid) -> RepoResult<Option<Client>>;
    async fn list_clients(&self, params: &ListParams) -> RepoResult<Vec<Client>>;
    async fn update_client(&self, id: Uuid, req: UpdateClientRequest) -> RepoResult<Option<Client>>;
    async fn delete_client(&self, id: Uuid) -> RepoResult<bool>;

    // --- Products ---
    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product>;
    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>>;
    async fn list_products(&self, params: &ListParams) -> RepoResult<Vec<Product>>;
    async fn update_product(&self, id: Uuid, req: UpdateProductRequest)
    -> RepoResult<Option<Product>>;
    async fn set_product_image(&self, id: Uuid, image_key: String) -> RepoResult<Option<Product>>;
    async fn delete_product(&self, id: Uuid) -> RepoResult<bool>;

    // --- Services ---
    async fn create_service(&self, req: CreateServiceRequest) -> RepoResult<Service>;
    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>>;
    async fn list_services(&self, params: &ListParams) -> RepoResult<Vec<Service>>;
    async fn update_service(&self, id: Uuid, req: UpdateServiceRequest)
    -> RepoResult<Option<Service>>;
    async fn delete_service(&self, id: Uuid) -> RepoResult<bool>;

    // --- Orders ---
    /// Prices the lines from the catalog, decrements product stock and stores the order,
    /// all or nothing. Unknown client/item → `NotFound`; inactive item or insufficient
    /// stock → `Conflict`.
    async fn create_order(&self, order: NewOrder) -> RepoResult<OrderDetail>;
    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetail>>;
    async fn list_orders(&self, query: &OrderQuery) -> RepoResult<Vec<Order>>;
    /// Applies a status transition; cancelling restocks product lines. The current status
    /// is read under the same lock that applies the change, so voiding a completed order
    /// without `can_void_completed` is `Forbidden` no matter who completed it meanwhile.
    async fn set_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        can_void_completed: bool,
    ) -> RepoResult<OrderDetail>;

    // --- Dashboard ---
    async fn get_stats(&self) -> RepoResult<DashboardStats>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Checks a requested transition against the current status and the caller's rights.
pub(crate) fn check_transition(
    current: OrderStatus,
    next: OrderStatus,
    can_void_completed: bool,
) -> RepoResult<()> {
    if !sales::can_transition(current, next) {
        return Err(RepositoryError::Conflict(sales::transition_error(current, next)));
    }
    if current == OrderStatus::Completed && next == OrderStatus::Cancelled && !can_void_completed {
        return Err(RepositoryError::Forbidden(
            "only an admin can cancel a completed order".to_string(),
        ));
    }
    Ok(())
}

/// Totals for a set of priced lines; amounts that do not fit are a validation error.
pub(crate) fn order_totals(items: &[OrderItem], rate_bps: i64) -> RepoResult<sales::Totals> {
    sales::compute_totals(items.iter().map(|i| i.line_total), rate_bps)
        .ok_or_else(|| RepositoryError::Invalid("order total is too large".to_string()))
}

/// Builds one priced order line from a catalog snapshot.
pub(crate) fn priced_item(
    order_id: Uuid,
    request: &OrderItemRequest,
    description: String,
    unit_price: i64,
) -> RepoResult<OrderItem> {
    let line_total = sales::line_total(unit_price, request.quantity)
        .ok_or_else(|| RepositoryError::Invalid("order line total is too large".to_string()))?;

    Ok(OrderItem {
        id: Uuid::new_v4(),
        order_id,
        kind: request.kind,
        product_id: (request.kind == ItemKind::Product).then_some(request.item_id),
        service_id: (request.kind == ItemKind::Service).then_some(request.item_id),
        description,
        quantity: request.quantity,
        unit_price,
        line_total,
    })
}
