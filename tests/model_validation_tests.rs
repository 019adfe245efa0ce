use serde_json::json;
use tecnicentro_api::models::{
    CreateOrderRequest, CreateProductRequest, CreateServiceRequest, CreateUserRequest, ItemKind,
    Order, OrderDetail, OrderItem, OrderStatus, PaymentMethod, Role, UpdateClientRequest,
    UpdateProductRequest, User, UserProfile,
};
use uuid::Uuid;

#[test]
fn test_enums_use_lowercase_text() {
    assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
    assert_eq!(serde_json::to_value(OrderStatus::Cancelled).unwrap(), json!("cancelled"));
    assert_eq!(serde_json::to_value(PaymentMethod::Transfer).unwrap(), json!("transfer"));
    assert_eq!(serde_json::to_value(ItemKind::Service).unwrap(), json!("service"));

    let status: OrderStatus = serde_json::from_value(json!("completed")).unwrap();
    assert_eq!(status, OrderStatus::Completed);
    assert!(serde_json::from_value::<OrderStatus>(json!("Completed")).is_err());
}

#[test]
fn test_enum_text_conversion_matches_database_values() {
    assert_eq!(Role::try_from("employee".to_string()).unwrap(), Role::Employee);
    assert_eq!(OrderStatus::Pending.to_string(), "pending");

    let err = PaymentMethod::try_from("cheque".to_string()).unwrap_err();
    assert_eq!(err.to_string(), "unknown PaymentMethod value: cheque");
}

#[test]
fn test_user_profile_never_exposes_secrets() {
    let user = User {
        id: Uuid::new_v4(),
        email: "ana@tecnicentrojr.co".to_string(),
        username: "ana".to_string(),
        full_name: "Ana Rojas".to_string(),
        password_hash: "$argon2id$secret".to_string(),
        role: Role::Employee,
        email_verified: false,
        verification_token: Some("pending-token".to_string()),
        ..Default::default()
    };

    let profile = serde_json::to_value(UserProfile::from(user)).unwrap();
    let object = profile.as_object().unwrap();

    assert!(!object.contains_key("password_hash"));
    assert!(!object.contains_key("verification_token"));
    assert_eq!(profile["role"], "employee");
    assert_eq!(profile["email_verified"], false);
}

#[test]
fn test_create_order_defaults_to_cash() {
    let request: CreateOrderRequest = serde_json::from_value(json!({
        "client_id": Uuid::new_v4(),
        "items": [{ "kind": "product", "item_id": Uuid::new_v4(), "quantity": 3 }]
    }))
    .unwrap();

    assert_eq!(request.payment_method, PaymentMethod::Cash);
    assert!(request.notes.is_none());
    assert_eq!(request.items[0].quantity, 3);
}

#[test]
fn test_unknown_item_kind_is_rejected() {
    let result = serde_json::from_value::<CreateOrderRequest>(json!({
        "client_id": Uuid::new_v4(),
        "items": [{ "kind": "gift", "item_id": Uuid::new_v4(), "quantity": 1 }]
    }));
    assert!(result.is_err());
}

#[test]
fn test_catalog_items_default_to_active() {
    let product: CreateProductRequest = serde_json::from_value(json!({
        "sku": "OIL-1", "name": "Aceite", "price": 45000, "stock": 10
    }))
    .unwrap();
    assert!(product.active);
    assert!(product.description.is_none());

    let service: CreateServiceRequest = serde_json::from_value(json!({
        "name": "Lavado", "price": 20000
    }))
    .unwrap();
    assert!(service.active);
    assert!(service.duration_minutes.is_none());
}

#[test]
fn test_create_user_defaults_to_employee() {
    let request: CreateUserRequest = serde_json::from_value(json!({
        "email": "nuevo@tecnicentrojr.co",
        "username": "nuevo",
        "full_name": "Nuevo",
        "password": "clave2024"
    }))
    .unwrap();
    assert_eq!(request.role, Role::Employee);
}

#[test]
fn test_partial_updates_accept_empty_objects() {
    let update: UpdateProductRequest = serde_json::from_value(json!({})).unwrap();
    assert!(update.price.is_none());
    assert!(update.stock.is_none());

    let update: UpdateClientRequest = serde_json::from_value(json!({ "phone": "3001234567" })).unwrap();
    assert_eq!(update.phone.as_deref(), Some("3001234567"));
    assert!(update.full_name.is_none());

    // Absent fields stay absent when echoed back.
    let echoed = serde_json::to_value(&update).unwrap();
    assert_eq!(echoed, json!({ "phone": "3001234567" }));
}

#[test]
fn test_order_detail_flattens_header() {
    let order_id = Uuid::new_v4();
    let detail = OrderDetail {
        order: Order {
            id: order_id,
            receipt_number: 42,
            subtotal: 100_000,
            tax: 19_000,
            total: 119_000,
            ..Default::default()
        },
        items: vec![OrderItem {
            order_id,
            kind: ItemKind::Service,
            description: "Alineacion".to_string(),
            quantity: 1,
            unit_price: 100_000,
            line_total: 100_000,
            ..Default::default()
        }],
    };

    let value = serde_json::to_value(&detail).unwrap();
    assert_eq!(value["receipt_number"], 42);
    assert_eq!(value["total"], 119_000);
    assert_eq!(value["status"], "pending");
    assert!(value.get("order").is_none());
    assert_eq!(value["items"][0]["kind"], "service");
}
