mod common;

use axum::http::{Method, StatusCode};
use common::{PASSWORD, spawn_app, spawn_with_mailer};
use serde_json::json;
use tecnicentro_api::{MockMailer, models::Role};

fn extract_token(text: &str, marker: &str) -> String {
    let start = text.find(marker).expect("marker in email") + marker.len();
    text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let (status, body) = app.raw_request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app();
    let (status, doc) = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/orders"].is_object());
    assert!(doc["paths"]["/auth/login"].is_object());
}

#[tokio::test]
async fn test_register_verify_login_flow() {
    let app = spawn_app();
    let register = json!({
        "email": "Ana@TecnicentroJR.co",
        "username": "ana",
        "full_name": "Ana Rojas",
        "password": PASSWORD,
    });

    let (status, profile) = app.request(Method::POST, "/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["email"], "ana@tecnicentrojr.co");
    assert_eq!(profile["role"], "employee");
    assert_eq!(profile["email_verified"], false);
    assert!(profile.get("password_hash").is_none());

    // Unverified accounts cannot log in yet.
    let login = json!({ "identifier": "ana", "password": PASSWORD });
    let (status, _) = app.request(Method::POST, "/auth/login", None, Some(login.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mail = app.mailer.last_to("ana@tecnicentrojr.co").expect("verification email");
    let token = extract_token(&mail.text, "token=");

    let (status, verified) = app
        .request(Method::POST, "/auth/verify-email", None, Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["email_verified"], true);

    // The token is single-use.
    let (status, _) = app
        .request(Method::POST, "/auth/verify-email", None, Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, pair) = app.request(Method::POST, "/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pair["token_type"], "Bearer");
    assert_eq!(pair["expires_in"], 900);

    let access = pair["access_token"].as_str().unwrap();
    let (status, me) = app.get("/users/me", access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ana");
}

#[tokio::test]
async fn test_register_succeeds_when_mail_delivery_fails() {
    let app = spawn_with_mailer(MockMailer::new_failing());
    let register = json!({
        "email": "sincorreo@tecnicentrojr.co",
        "username": "sincorreo",
        "full_name": "Sin Correo",
        "password": PASSWORD,
    });

    let (status, _) = app.request(Method::POST, "/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CREATED);

    // The account can ask for a new link later.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/resend-verification",
            None,
            Some(json!({ "email": "sincorreo@tecnicentrojr.co" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_resend_verification_issues_a_new_token() {
    let app = spawn_app();
    let register = json!({
        "email": "reenvio@tecnicentrojr.co",
        "username": "reenvio",
        "full_name": "Reenvio",
        "password": PASSWORD,
    });
    app.request(Method::POST, "/auth/register", None, Some(register)).await;
    let first = extract_token(&app.mailer.last_to("reenvio@tecnicentrojr.co").unwrap().text, "token=");

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/resend-verification",
            None,
            Some(json!({ "email": "reenvio@tecnicentrojr.co" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let second = extract_token(&app.mailer.last_to("reenvio@tecnicentrojr.co").unwrap().text, "token=");
    assert_ne!(first, second);

    // The superseded token no longer verifies.
    let (status, _) = app
        .request(Method::POST, "/auth/verify-email", None, Some(json!({ "token": first })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .request(Method::POST, "/auth/verify-email", None, Some(json!({ "token": second })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = spawn_app();
    app.seed_user("carlos", Role::Employee).await;

    let duplicate_email = json!({
        "email": "CARLOS@tecnicentrojr.co",
        "username": "otro",
        "full_name": "Otro",
        "password": PASSWORD,
    });
    let (status, body) = app
        .request(Method::POST, "/auth/register", None, Some(duplicate_email))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let duplicate_username = json!({
        "email": "nuevo@tecnicentrojr.co",
        "username": "carlos",
        "full_name": "Otro",
        "password": PASSWORD,
    });
    let (status, _) = app
        .request(Method::POST, "/auth/register", None, Some(duplicate_username))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let weak_password = json!({
        "email": "nuevo@tecnicentrojr.co",
        "username": "nuevo",
        "full_name": "Nuevo",
        "password": "corta",
    });
    let (status, body) = app
        .request(Method::POST, "/auth/register", None, Some(weak_password))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let bad_email = json!({
        "email": "sin-arroba",
        "username": "nuevo",
        "full_name": "Nuevo",
        "password": PASSWORD,
    });
    let (status, _) = app.request(Method::POST, "/auth/register", None, Some(bad_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_with_wrong_password_or_unknown_user() {
    let app = spawn_app();
    app.seed_user("maria", Role::Employee).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "maria", "password": "equivocada1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid credentials");

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "nadie", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Email works as identifier too, case-insensitively.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "MARIA@tecnicentrojr.co", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotation_and_reuse_detection() {
    let app = spawn_app();
    app.seed_user("rotar", Role::Employee).await;

    let (_, first) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "rotar", "password": PASSWORD })),
        )
        .await;
    let old_refresh = first["refresh_token"].as_str().unwrap().to_string();

    let (status, second) = app
        .request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": old_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = second["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, old_refresh);

    // Replaying the rotated token is rejected...
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": old_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // ...and revokes the token issued by the legitimate rotation as well.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": new_refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = spawn_app();
    let (_, access) = app.seed_user("mezcla", Role::Employee).await;

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": access })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = spawn_app();
    app.seed_user("salir", Role::Employee).await;

    let (_, pair) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "salir", "password": PASSWORD })),
        )
        .await;
    let access = pair["access_token"].as_str().unwrap();
    let refresh = pair["refresh_token"].as_str().unwrap();

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/logout",
            Some(access),
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let app = spawn_app();
    app.seed_user("olvido", Role::Employee).await;

    // Unknown addresses get the same answer and no email.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "nadie@tecnicentrojr.co" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(app.mailer.sent().is_empty());

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "olvido@tecnicentrojr.co" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let mail = app.mailer.last_to("olvido@tecnicentrojr.co").unwrap();
    let token = extract_token(&mail.text, "token=");

    // A weak password is refused without consuming the token.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "debil" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "nueva2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Single use.
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "otra20255" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "olvido", "password": "nueva2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let app = spawn_app();
    let (_, token) = app.seed_user("cambio", Role::Employee).await;

    let (status, _) = app
        .request(
            Method::PUT,
            "/users/me/password",
            Some(&token),
            Some(json!({ "current_password": "incorrecta1", "new_password": "nueva2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::PUT,
            "/users/me/password",
            Some(&token),
            Some(json!({ "current_password": PASSWORD, "new_password": "nueva2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app();

    let (status, body) = app.request(Method::GET, "/clients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app.get("/orders", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(Method::GET, "/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_forbid_employees() {
    let app = spawn_app();
    let (_, employee) = app.seed_user("empleado", Role::Employee).await;
    let (_, admin) = app.seed_user("jefe", Role::Admin).await;

    for uri in ["/admin/stats", "/users"] {
        let (status, body) = app.get(uri, &employee).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["error"], "forbidden");

        let (status, _) = app.get(uri, &admin).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }

    let (status, _) = app
        .request(
            Method::POST,
            "/products",
            Some(&employee),
            Some(json!({ "sku": "X-1", "name": "Filtro", "price": 1000, "stock": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleted_user_token_stops_working() {
    let app = spawn_app();
    let (_, admin) = app.seed_user("jefe", Role::Admin).await;
    let (employee, employee_token) = app.seed_user("temporal", Role::Employee).await;

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/users/{}", employee.id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/users/me", &employee_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sale_lifecycle_over_http() {
    let app = spawn_app();
    let (_, cashier) = app.seed_user("caja", Role::Employee).await;
    let (_, admin) = app.seed_user("jefe", Role::Admin).await;
    let client = app.seed_client("1020304050").await;
    let oil = app.seed_product("OIL-5W30", 45_000, 10).await;
    let alignment = app.seed_service("Alineacion", 60_000).await;

    let (status, order) = app
        .request(
            Method::POST,
            "/orders",
            Some(&cashier),
            Some(json!({
                "client_id": client.id,
                "payment_method": "card",
                "items": [
                    { "kind": "product", "item_id": oil.id, "quantity": 2 },
                    { "kind": "service", "item_id": alignment.id, "quantity": 1 }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], 150_000);
    assert_eq!(order["tax"], 28_500);
    assert_eq!(order["total"], 178_500);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, product) = app.get(&format!("/products/{}", oil.id), &cashier).await;
    assert_eq!(product["stock"], 8);

    let (status, completed) = app
        .request(
            Method::PATCH,
            &format!("/orders/{order_id}/status"),
            Some(&cashier),
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");

    // Employees cannot void a completed sale.
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/orders/{order_id}/status"),
            Some(&cashier),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/orders/{order_id}/status"),
            Some(&admin),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, product) = app.get(&format!("/products/{}", oil.id), &cashier).await;
    assert_eq!(product["stock"], 10);

    // Cancelled is terminal.
    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/orders/{order_id}/status"),
            Some(&admin),
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "cannot change order status from cancelled to completed");

    let (status, receipt) = app.get(&format!("/orders/{order_id}/receipt"), &cashier).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["client_document"], "1020304050");
    assert_eq!(receipt["cashier"], "caja test");

    let (status, text) = app
        .raw_request(
            Method::GET,
            &format!("/orders/{order_id}/receipt.txt"),
            Some(&cashier),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(text).unwrap();
    assert!(text.contains("ANULADO"));
    assert!(text.contains("$ 178.500"));
}

#[tokio::test]
async fn test_overselling_is_rejected() {
    let app = spawn_app();
    let (_, cashier) = app.seed_user("caja", Role::Employee).await;
    let client = app.seed_client("99887766").await;
    let tyre = app.seed_product("TYRE-185", 250_000, 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/orders",
            Some(&cashier),
            Some(json!({
                "client_id": client.id,
                "items": [{ "kind": "product", "item_id": tyre.id, "quantity": 2 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("insufficient stock"));

    let (status, _) = app
        .request(
            Method::POST,
            "/orders",
            Some(&cashier),
            Some(json!({ "client_id": client.id, "items": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_total_that_does_not_fit_is_rejected() {
    let app = spawn_app();
    let (_, cashier) = app.seed_user("caja", Role::Employee).await;
    let client = app.seed_client("55443322").await;
    let engine = app.seed_product("MOTOR-V8", 10_000_000_000_000_000, 2).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/orders",
            Some(&cashier),
            Some(json!({
                "client_id": client.id,
                "items": [{ "kind": "product", "item_id": engine.id, "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "order total is too large");

    let stored = app.repo.get_product(engine.id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 2);
}

#[tokio::test]
async fn test_list_orders_filters_by_status() {
    let app = spawn_app();
    let (_, cashier) = app.seed_user("caja", Role::Employee).await;
    let client = app.seed_client("11223344").await;
    let wash = app.seed_service("Lavado", 20_000).await;

    for _ in 0..3 {
        let (status, _) = app
            .request(
                Method::POST,
                "/orders",
                Some(&cashier),
                Some(json!({
                    "client_id": client.id,
                    "items": [{ "kind": "service", "item_id": wash.id, "quantity": 1 }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, orders) = app.get("/orders?status=pending&per_page=2", &cashier).await;
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    // Newest receipt first.
    assert!(orders[0]["receipt_number"].as_i64() > orders[1]["receipt_number"].as_i64());

    let (_, orders) = app.get("/orders?status=completed", &cashier).await;
    assert!(orders.as_array().unwrap().is_empty());
}
