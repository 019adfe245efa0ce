#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tecnicentro_api::{
    AppConfig, AppState, MemoryRepository, MockMailer, MockStorageService, create_router,
    auth::{AuthUser, hash_password, issue_access_token},
    models::{
        Client, CreateClientRequest, CreateProductRequest, CreateServiceRequest, NewUser, Product,
        Role, Service, User,
    },
    repository::RepositoryState,
};
use tower::util::ServiceExt;

pub const PASSWORD: &str = "taller2024";

/// Everything a test needs to drive the app and inspect its side effects.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: RepositoryState,
    pub mailer: MockMailer,
}

fn build(config: AppConfig, storage: MockStorageService, mailer: MockMailer) -> TestApp {
    let state = AppState {
        repo: Arc::new(MemoryRepository::new()),
        storage: Arc::new(storage),
        mailer: Arc::new(mailer.clone()),
        config,
    };
    TestApp {
        router: create_router(state.clone()),
        repo: state.repo.clone(),
        state,
        mailer,
    }
}

pub fn spawn_with(config: AppConfig, storage: MockStorageService) -> TestApp {
    build(config, storage, MockMailer::new())
}

pub fn spawn_with_mailer(mailer: MockMailer) -> TestApp {
    build(AppConfig::default(), MockStorageService::new(), mailer)
}

pub fn spawn_app() -> TestApp {
    spawn_with(AppConfig::default(), MockStorageService::new())
}

impl TestApp {
    /// Sends one request through the full router and returns status and JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.raw_request(method, uri, token, body).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn raw_request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post<T: Serialize>(&self, uri: &str, token: Option<&str>, body: &T) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(serde_json::to_value(body).unwrap()))
            .await
    }

    /// Inserts a verified user directly and returns it with a signed access token.
    pub async fn seed_user(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                email: format!("{username}@tecnicentrojr.co"),
                username: username.to_string(),
                full_name: format!("{username} test"),
                password_hash: hash_password(PASSWORD).unwrap(),
                role,
                email_verified: true,
                verification_token: None,
            })
            .await
            .unwrap();
        let token = issue_access_token(&self.state.config, &user).unwrap();
        (user, token)
    }

    pub async fn seed_client(&self, document: &str) -> Client {
        self.repo
            .create_client(CreateClientRequest {
                document_number: document.to_string(),
                full_name: format!("Cliente {document}"),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn seed_product(&self, sku: &str, price: i64, stock: i32) -> Product {
        self.repo
            .create_product(CreateProductRequest {
                sku: sku.to_string(),
                name: format!("Producto {sku}"),
                description: None,
                price,
                stock,
                active: true,
            })
            .await
            .unwrap()
    }

    pub async fn seed_service(&self, name: &str, price: i64) -> Service {
        self.repo
            .create_service(CreateServiceRequest {
                name: name.to_string(),
                description: None,
                price,
                duration_minutes: Some(60),
                active: true,
            })
            .await
            .unwrap()
    }
}

pub fn auth_user(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        role: user.role,
    }
}
