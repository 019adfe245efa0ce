use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    ListParams, OrderQuery, Pagination, RepoResult, Repository, RepositoryError, check_transition,
    order_totals, priced_item,
};
use crate::{
    models::{
        Client, CreateClientRequest, CreateProductRequest, CreateServiceRequest, DashboardStats,
        ItemKind, NewOrder, NewUser, Order, OrderDetail, OrderItem, OrderStatus, PasswordReset,
        Product, RefreshTokenRecord, Role, Service, UpdateClientRequest, UpdateProductRequest,
        UpdateServiceRequest, UpdateUserRequest, User,
    },
    sales,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    password_resets: HashMap<String, PasswordReset>,
    clients: HashMap<Uuid, Client>,
    products: HashMap<Uuid, Product>,
    services: HashMap<Uuid, Service>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    last_receipt_number: i64,
}

/// MemoryRepository
///
/// An in-process implementation of `Repository` used by the test suite and by local
/// runs without `DATABASE_URL`. It enforces the same uniqueness, reference and stock
/// rules as the Postgres schema. All tables sit behind one lock, so multi-table
/// operations such as `create_order` are atomic.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a table half-written for the
        // operations below, so a poisoned lock is still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn matches_search(params: &ListParams, fields: &[Option<&str>]) -> bool {
    let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = search.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

fn page<T>(rows: Vec<T>, pagination: &Pagination) -> Vec<T> {
    rows.into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect()
}

fn conflict(what: &str) -> RepositoryError {
    RepositoryError::Conflict(format!("duplicate value violates {what}"))
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn detail(&self, order: &Order) -> OrderDetail {
        let mut items: Vec<OrderItem> = self
            .order_items
            .iter()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.kind
                .as_str()
                .cmp(b.kind.as_str())
                .then_with(|| a.description.cmp(&b.description))
        });
        OrderDetail {
            order: order.clone(),
            items,
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    // --- USERS ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut t = self.lock();
        if t.email_taken(&user.email, None) {
            return Err(conflict("users_email_key"));
        }
        if t.users.values().any(|u| u.username == user.username) {
            return Err(conflict("users_username_key"));
        }
        if let Some(token) = &user.verification_token {
            if t.users.values().any(|u| u.verification_token.as_ref() == Some(token)) {
                return Err(conflict("users_verification_token_key"));
            }
        }

        let now = Utc::now();
        let record = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            password_hash: user.password_hash,
            role: user.role,
            email_verified: user.email_verified,
            verification_token: user.verification_token,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user_by_login(&self, identifier: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(identifier) || u.username == identifier)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self, params: &ListParams) -> RepoResult<Vec<User>> {
        let t = self.lock();
        let mut rows: Vec<User> = t
            .users
            .values()
            .filter(|u| {
                matches_search(
                    params,
                    &[Some(&u.email), Some(&u.username), Some(&u.full_name)],
                )
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, &params.pagination))
    }

    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        let mut t = self.lock();
        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = req.full_name {
            user.full_name = full_name;
        }
        if let Some(role) = req.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_verification_token(&self, id: Uuid, token: String) -> RepoResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&id) {
            Some(user) if !user.email_verified => {
                user.verification_token = Some(token);
                user.updated_at = Utc::now();
                true
            }
            _ => false,
        })
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if !t.users.contains_key(&id) {
            return Ok(false);
        }
        if t.orders.values().any(|o| o.created_by == id) {
            return Err(RepositoryError::Conflict(
                "record is still referenced (orders_created_by_fkey)".to_string(),
            ));
        }
        t.users.remove(&id);
        t.refresh_tokens.retain(|_, r| r.user_id != id);
        t.password_resets.retain(|_, r| r.user_id != id);
        Ok(true)
    }

    async fn count_admins(&self) -> RepoResult<i64> {
        Ok(self
            .lock()
            .users
            .values()
            .filter(|u| u.role == Role::Admin)
            .count() as i64)
    }

    async fn verify_email(&self, token: &str) -> RepoResult<Option<User>> {
        let mut t = self.lock();
        let Some(user) = t
            .users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        user.email_verified = true;
        user.verification_token = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let mut t = self.lock();
        let stale: Vec<Uuid> = t
            .users
            .values()
            .filter(|u| !u.email_verified && u.created_at < cutoff)
            .map(|u| u.id)
            .collect();
        for id in &stale {
            t.users.remove(id);
        }
        t.refresh_tokens.retain(|_, r| !stale.contains(&r.user_id));
        t.password_resets.retain(|_, r| !stale.contains(&r.user_id));
        Ok(stale.len() as u64)
    }

    // --- REFRESH TOKENS ---

    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()> {
        let mut t = self.lock();
        if !t.users.contains_key(&record.user_id) {
            return Err(RepositoryError::Conflict(
                "record is still referenced (refresh_tokens_user_id_fkey)".to_string(),
            ));
        }
        t.refresh_tokens.insert(record.id, record);
        Ok(())
    }

    async fn get_refresh_token(&self, id: Uuid) -> RepoResult<Option<RefreshTokenRecord>> {
        Ok(self.lock().refresh_tokens.get(&id).cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        Ok(match t.refresh_tokens.get_mut(&id) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut t = self.lock();
        let mut revoked = 0;
        for record in t.refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    // --- PASSWORD RESETS ---

    async fn create_password_reset(&self, reset: PasswordReset) -> RepoResult<()> {
        let mut t = self.lock();
        if t.password_resets.contains_key(&reset.token) {
            return Err(conflict("password_resets_pkey"));
        }
        t.password_resets.insert(reset.token.clone(), reset);
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        let mut t = self.lock();
        Ok(match t.password_resets.get_mut(token) {
            Some(reset) if !reset.used && reset.expires_at > now => {
                reset.used = true;
                Some(reset.user_id)
            }
            _ => None,
        })
    }

    // --- CLIENTS ---

    async fn create_client(&self, req: CreateClientRequest) -> RepoResult<Client> {
        let mut t = self.lock();
        if t.clients.values().any(|c| c.document_number == req.document_number) {
            return Err(conflict("clients_document_number_key"));
        }
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            document_number: req.document_number,
            full_name: req.full_name,
            email: req.email,
            phone: req.phone,
            address: req.address,
            created_at: now,
            updated_at: now,
        };
        t.clients.insert(client.id, client.clone());
        Ok(client)
    }

    async fn get_client(&self, id: Uuid) -> RepoResult<Option<Client>> {
        Ok(self.lock().clients.get(&id).cloned())
    }

    async fn list_clients(&self, params: &ListParams) -> RepoResult<Vec<Client>> {
        let t = self.lock();
        let mut rows: Vec<Client> = t
            .clients
            .values()
            .filter(|c| {
                matches_search(
                    params,
                    &[
                        Some(&c.document_number),
                        Some(&c.full_name),
                        c.email.as_deref(),
                    ],
                )
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(page(rows, &params.pagination))
    }

    async fn update_client(&self, id: Uuid, req: UpdateClientRequest) -> RepoResult<Option<Client>> {
        let mut t = self.lock();
        if let Some(doc) = &req.document_number {
            if t.clients.values().any(|c| c.id != id && &c.document_number == doc) {
                return Err(conflict("clients_document_number_key"));
            }
        }
        let Some(client) = t.clients.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = req.document_number {
            client.document_number = v;
        }
        if let Some(v) = req.full_name {
            client.full_name = v;
        }
        if req.email.is_some() {
            client.email = req.email;
        }
        if req.phone.is_some() {
            client.phone = req.phone;
        }
        if req.address.is_some() {
            client.address = req.address;
        }
        client.updated_at = Utc::now();
        Ok(Some(client.clone()))
    }

    async fn delete_client(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if t.orders.values().any(|o| o.client_id == id) {
            return Err(RepositoryError::Conflict(
                "record is still referenced (orders_client_id_fkey)".to_string(),
            ));
        }
        Ok(t.clients.remove(&id).is_some())
    }

    // --- PRODUCTS ---

    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product> {
        let mut t = self.lock();
        if t.products.values().any(|p| p.sku == req.sku) {
            return Err(conflict("products_sku_key"));
        }
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            sku: req.sku,
            name: req.name,
            description: req.description,
            price: req.price,
            stock: req.stock,
            image_key: None,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        t.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn list_products(&self, params: &ListParams) -> RepoResult<Vec<Product>> {
        let t = self.lock();
        let mut rows: Vec<Product> = t
            .products
            .values()
            .filter(|p| matches_search(params, &[Some(&p.sku), Some(&p.name)]))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(rows, &params.pagination))
    }

    async fn update_product(
        &self,
        id: Uuid,
        req: UpdateProductRequest,
    ) -> RepoResult<Option<Product>> {
        let mut t = self.lock();
        if let Some(sku) = &req.sku {
            if t.products.values().any(|p| p.id != id && &p.sku == sku) {
                return Err(conflict("products_sku_key"));
            }
        }
        let Some(product) = t.products.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = req.sku {
            product.sku = v;
        }
        if let Some(v) = req.name {
            product.name = v;
        }
        if req.description.is_some() {
            product.description = req.description;
        }
        if let Some(v) = req.price {
            product.price = v;
        }
        if let Some(v) = req.stock {
            product.stock = v;
        }
        if let Some(v) = req.active {
            product.active = v;
        }
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn set_product_image(&self, id: Uuid, image_key: String) -> RepoResult<Option<Product>> {
        let mut t = self.lock();
        Ok(t.products.get_mut(&id).map(|product| {
            product.image_key = Some(image_key);
            product.updated_at = Utc::now();
            product.clone()
        }))
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if t.order_items.iter().any(|i| i.product_id == Some(id)) {
            return Err(RepositoryError::Conflict(
                "record is still referenced (order_items_product_id_fkey)".to_string(),
            ));
        }
        Ok(t.products.remove(&id).is_some())
    }

    // --- SERVICES ---

    async fn create_service(&self, req: CreateServiceRequest) -> RepoResult<Service> {
        let mut t = self.lock();
        if t.services.values().any(|s| s.name == req.name) {
            return Err(conflict("services_name_key"));
        }
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            price: req.price,
            duration_minutes: req.duration_minutes,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        t.services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>> {
        Ok(self.lock().services.get(&id).cloned())
    }

    async fn list_services(&self, params: &ListParams) -> RepoResult<Vec<Service>> {
        let t = self.lock();
        let mut rows: Vec<Service> = t
            .services
            .values()
            .filter(|s| matches_search(params, &[Some(&s.name), s.description.as_deref()]))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(rows, &params.pagination))
    }

    async fn update_service(
        &self,
        id: Uuid,
        req: UpdateServiceRequest,
    ) -> RepoResult<Option<Service>> {
        let mut t = self.lock();
        if let Some(name) = &req.name {
            if t.services.values().any(|s| s.id != id && &s.name == name) {
                return Err(conflict("services_name_key"));
            }
        }
        let Some(service) = t.services.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = req.name {
            service.name = v;
        }
        if req.description.is_some() {
            service.description = req.description;
        }
        if let Some(v) = req.price {
            service.price = v;
        }
        if req.duration_minutes.is_some() {
            service.duration_minutes = req.duration_minutes;
        }
        if let Some(v) = req.active {
            service.active = v;
        }
        service.updated_at = Utc::now();
        Ok(Some(service.clone()))
    }

    async fn delete_service(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if t.order_items.iter().any(|i| i.service_id == Some(id)) {
            return Err(RepositoryError::Conflict(
                "record is still referenced (order_items_service_id_fkey)".to_string(),
            ));
        }
        Ok(t.services.remove(&id).is_some())
    }

    // --- ORDERS ---

    async fn create_order(&self, order: NewOrder) -> RepoResult<OrderDetail> {
        let mut t = self.lock();

        if !t.clients.contains_key(&order.client_id) {
            return Err(RepositoryError::NotFound("client".to_string()));
        }

        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(order.items.len());
        // Stock is reserved on a scratch copy and only written back once every line passed.
        let mut reserved: HashMap<Uuid, i32> = HashMap::new();

        for line in &order.items {
            match line.kind {
                ItemKind::Product => {
                    let product = t.products.get(&line.item_id).ok_or_else(|| {
                        RepositoryError::NotFound(format!("product {}", line.item_id))
                    })?;
                    if !product.active {
                        return Err(RepositoryError::Conflict(format!(
                            "product {} is inactive",
                            product.sku
                        )));
                    }
                    let remaining = reserved.entry(product.id).or_insert(product.stock);
                    if *remaining < line.quantity {
                        return Err(RepositoryError::Conflict(format!(
                            "insufficient stock for product {}",
                            product.sku
                        )));
                    }
                    *remaining -= line.quantity;
                    items.push(priced_item(
                        order_id,
                        line,
                        product.name.clone(),
                        product.price,
                    )?);
                }
                ItemKind::Service => {
                    let service = t.services.get(&line.item_id).ok_or_else(|| {
                        RepositoryError::NotFound(format!("service {}", line.item_id))
                    })?;
                    if !service.active {
                        return Err(RepositoryError::Conflict(format!(
                            "service {} is inactive",
                            service.name
                        )));
                    }
                    items.push(priced_item(
                        order_id,
                        line,
                        service.name.clone(),
                        service.price,
                    )?);
                }
            }
        }

        let totals = order_totals(&items, order.tax_rate_bps)?;
        let now = Utc::now();
        for (product_id, stock) in reserved {
            if let Some(product) = t.products.get_mut(&product_id) {
                product.stock = stock;
                product.updated_at = now;
            }
        }

        t.last_receipt_number += 1;
        let header = Order {
            id: order_id,
            receipt_number: t.last_receipt_number,
            client_id: order.client_id,
            created_by: order.created_by,
            status: OrderStatus::Pending,
            payment_method: order.payment_method,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            notes: order.notes,
            created_at: now,
            updated_at: now,
        };

        t.orders.insert(order_id, header.clone());
        t.order_items.extend(items);
        Ok(t.detail(&header))
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetail>> {
        let t = self.lock();
        Ok(t.orders.get(&id).map(|order| t.detail(order)))
    }

    async fn list_orders(&self, query: &OrderQuery) -> RepoResult<Vec<Order>> {
        let t = self.lock();
        let mut rows: Vec<Order> = t
            .orders
            .values()
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .filter(|o| query.client_id.is_none_or(|c| o.client_id == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.receipt_number.cmp(&a.receipt_number));
        Ok(page(rows, &query.pagination))
    }

    async fn set_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        can_void_completed: bool,
    ) -> RepoResult<OrderDetail> {
        let mut t = self.lock();
        let current = t
            .orders
            .get(&id)
            .map(|o| o.status)
            .ok_or_else(|| RepositoryError::NotFound("order".to_string()))?;
        check_transition(current, status, can_void_completed)?;

        let now = Utc::now();
        if status == OrderStatus::Cancelled {
            let mut restocked: HashMap<Uuid, i32> = HashMap::new();
            for item in t.order_items.iter().filter(|i| i.order_id == id) {
                let Some(product_id) = item.product_id else {
                    continue;
                };
                let stock = match restocked.get(&product_id) {
                    Some(stock) => *stock,
                    None => t.products.get(&product_id).map_or(0, |p| p.stock),
                };
                let stock = stock.checked_add(item.quantity).ok_or_else(|| {
                    RepositoryError::Conflict(format!(
                        "restocking product {product_id} would exceed the stock limit"
                    ))
                })?;
                restocked.insert(product_id, stock);
            }
            for (product_id, stock) in restocked {
                if let Some(product) = t.products.get_mut(&product_id) {
                    product.stock = stock;
                    product.updated_at = now;
                }
            }
        }

        let order = t
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound("order".to_string()))?;
        order.status = status;
        order.updated_at = now;
        let order = order.clone();
        Ok(t.detail(&order))
    }

    // --- DASHBOARD ---

    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        let t = self.lock();
        let completed = || {
            t.orders
                .values()
                .filter(|o| o.status == OrderStatus::Completed)
        };
        Ok(DashboardStats {
            total_clients: t.clients.len() as i64,
            total_products: t.products.len() as i64,
            total_services: t.services.len() as i64,
            total_orders: t.orders.len() as i64,
            completed_orders: completed().count() as i64,
            revenue: completed().map(|o| o.total).sum(),
            low_stock_products: t
                .products
                .values()
                .filter(|p| p.active && p.stock <= sales::LOW_STOCK_THRESHOLD)
                .count() as i64,
        })
    }
}
