use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use uuid::Uuid;

use super::{ApiResult, OrderFilter, blank_to_none, not_found};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorBody},
    models::{CreateOrderRequest, NewOrder, Order, OrderDetail, UpdateOrderStatusRequest},
    receipt::Receipt,
};

const MAX_ORDER_LINES: usize = 100;

fn validate_items(payload: &CreateOrderRequest) -> ApiResult<()> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("an order needs at least one item".to_string()));
    }
    if payload.items.len() > MAX_ORDER_LINES {
        return Err(AppError::Validation(format!(
            "an order cannot have more than {MAX_ORDER_LINES} items"
        )));
    }
    if let Some(line) = payload.items.iter().find(|line| line.quantity <= 0) {
        return Err(AppError::Validation(format!(
            "quantity must be positive (item {})",
            line.item_id
        )));
    }
    Ok(())
}

/// list_orders
///
/// [Authenticated Route] Order headers, newest receipt first, optionally filtered by
/// status and client.
#[utoipa::path(
    get,
    path = "/orders",
    tag = "orders",
    params(OrderFilter),
    responses((status = 200, description = "Orders", body = [Order]))
)]
pub async fn list_orders(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.repo.list_orders(&filter.into()).await?))
}

/// create_order
///
/// [Authenticated Route] Registers a sale. Prices come from the catalog, never from
/// the request; product stock is decremented in the same transaction. The order starts
/// as `pending`.
#[utoipa::path(
    post,
    path = "/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Created", body = OrderDetail),
        (status = 400, description = "No items or non-positive quantity", body = ErrorBody),
        (status = 404, description = "Unknown client, product or service", body = ErrorBody),
        (status = 409, description = "Inactive item or insufficient stock", body = ErrorBody)
    )
)]
pub async fn create_order(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderDetail>)> {
    validate_items(&payload)?;

    let detail = state
        .repo
        .create_order(NewOrder {
            client_id: payload.client_id,
            created_by: user.id,
            payment_method: payload.payment_method,
            notes: blank_to_none(payload.notes),
            items: payload.items,
            tax_rate_bps: state.config.tax_rate_bps,
        })
        .await?;

    tracing::info!(
        order_id = %detail.order.id,
        receipt_number = detail.order.receipt_number,
        total = detail.order.total,
        "order created"
    );
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Found", body = OrderDetail),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_order(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state.repo.get_order(id).await?.ok_or_else(|| not_found("order"))?;
    Ok(Json(detail))
}

/// update_order_status
///
/// [Authenticated Route] Moves an order through its lifecycle. Allowed:
/// pending → completed, pending → cancelled, completed → cancelled (admin only).
/// Cancelling puts product quantities back in stock.
#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated", body = OrderDetail),
        (status = 403, description = "Cancelling a completed order requires admin", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Transition not allowed", body = ErrorBody)
    )
)]
pub async fn update_order_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Json<OrderDetail>> {
    let detail = state
        .repo
        .set_order_status(id, payload.status, user.is_admin())
        .await?;

    tracing::info!(
        order_id = %id,
        status = %detail.order.status,
        user_id = %user.id,
        "order status changed"
    );
    Ok(Json(detail))
}

async fn load_receipt(state: &AppState, id: Uuid) -> ApiResult<Receipt> {
    let detail = state.repo.get_order(id).await?.ok_or_else(|| not_found("order"))?;
    let client = state
        .repo
        .get_client(detail.order.client_id)
        .await?
        .ok_or_else(|| not_found("client"))?;
    let cashier = state
        .repo
        .get_user(detail.order.created_by)
        .await?
        .map_or_else(|| "-".to_string(), |u| u.full_name);

    Ok(Receipt::build(&detail, &client, &cashier, &state.config.business))
}

/// get_receipt
///
/// [Authenticated Route] The receipt document for an order, as JSON.
#[utoipa::path(
    get,
    path = "/orders/{id}/receipt",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Receipt", body = Receipt),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_receipt(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Receipt>> {
    Ok(Json(load_receipt(&state, id).await?))
}

/// get_receipt_text
///
/// [Authenticated Route] The same receipt rendered for a 48-column thermal printer.
#[utoipa::path(
    get,
    path = "/orders/{id}/receipt.txt",
    tag = "orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Plain-text receipt", body = String, content_type = "text/plain"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_receipt_text(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let receipt = load_receipt(&state, id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        receipt.render_text(),
    ))
}
