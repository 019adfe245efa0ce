use crate::{
    AppState,
    handlers::{auth, clients, orders, products, services, users},
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Day-to-day counter operations available to every signed-in employee. Catalog writes
/// and client deletion share their paths with reads, so those handlers call
/// `AuthUser::require_admin` themselves.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/auth/logout", post(auth::logout))
        // --- Own account ---
        .route("/users/me", get(users::get_me))
        .route("/users/me/password", put(users::change_password))
        // --- Clients ---
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/{id}",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        // --- Catalog ---
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // POST /products/{id}/image
        // Presigned upload of the product picture straight to object storage.
        .route(
            "/products/{id}/image",
            post(products::request_product_image_upload),
        )
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/{id}",
            get(services::get_service)
                .put(services::update_service)
                .delete(services::delete_service),
        )
        // --- Sales ---
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", patch(orders::update_order_status))
        .route("/orders/{id}/receipt", get(orders::get_receipt))
        .route("/orders/{id}/receipt.txt", get(orders::get_receipt_text))
}
