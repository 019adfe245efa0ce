//! HTTP handlers, grouped by resource.
//!
//! Every handler returns `Result<_, AppError>`; authentication happens in the
//! `AuthUser` extractor and role checks happen inside the handler that needs them.

use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::OrderStatus,
    repository::{ListParams, OrderQuery, Pagination},
};

pub mod admin;
pub mod auth;
pub mod clients;
pub mod orders;
pub mod products;
pub mod services;
pub mod users;

pub type ApiResult<T> = Result<T, AppError>;

/// ListQuery
///
/// Query parameters accepted by every list endpoint except orders.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Case-insensitive substring match on the resource's text fields.
    pub search: Option<String>,
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Page size (default 20, max 100).
    pub per_page: Option<u32>,
}

impl From<ListQuery> for ListParams {
    fn from(query: ListQuery) -> Self {
        ListParams {
            search: query.search,
            pagination: Pagination::new(query.page, query.per_page),
        }
    }
}

/// Filters for GET /orders.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub client_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<OrderFilter> for OrderQuery {
    fn from(filter: OrderFilter) -> Self {
        OrderQuery {
            status: filter.status,
            client_id: filter.client_id,
            pagination: Pagination::new(filter.page, filter.per_page),
        }
    }
}

/// Trims a mandatory text field, rejecting it when blank.
pub(crate) fn required_text(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

/// Same as `required_text` for a field of a partial update, where absence is allowed.
pub(crate) fn optional_required_text(field: &str, value: Option<String>) -> ApiResult<Option<String>> {
    value.map(|v| required_text(field, &v)).transpose()
}

/// Blank optional text is stored as `NULL`.
pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn non_negative(field: &str, value: i64) -> ApiResult<()> {
    if value < 0 {
        return Err(AppError::Validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

pub(crate) fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{what} not found"))
}
