use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use sqlx::{PgPool, Postgres, Transaction, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{
    ListParams, OrderQuery, RepoResult, Repository, RepositoryError, check_transition,
    order_totals, priced_item,
};
use crate::{
    models::{
        Client, CreateClientRequest, CreateProductRequest, CreateServiceRequest, DashboardStats,
        ItemKind, NewOrder, NewUser, Order, OrderDetail, OrderItem, OrderStatus, PasswordReset,
        Product, RefreshTokenRecord, Service, UpdateClientRequest, UpdateProductRequest,
        UpdateServiceRequest, UpdateUserRequest, User,
    },
    sales,
};

const USER_COLUMNS: &str = "id, email, username, full_name, password_hash, role, email_verified, \
     verification_token, created_at, updated_at";
const CLIENT_COLUMNS: &str =
    "id, document_number, full_name, email, phone, address, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, sku, name, description, price, stock, image_key, active, created_at, updated_at";
const SERVICE_COLUMNS: &str =
    "id, name, description, price, duration_minutes, active, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, receipt_number, client_id, created_by, status, payment_method, \
     subtotal, tax, total, notes, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, kind, product_id, service_id, description, quantity, unit_price, line_total";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are checked at runtime so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn order_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> RepoResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY kind, description"
        );
        Ok(sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(&mut **tx)
            .await?)
    }
}

/// Appends `search` as an ILIKE match across `columns`, then paging.
fn push_search_and_page(
    builder: &mut QueryBuilder<'_, Postgres>,
    params: &ListParams,
    columns: &[&str],
    order_by: &str,
) {
    if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        builder.push(" WHERE (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(*column);
            builder.push(" ILIKE ");
            builder.push_bind(pattern.clone());
        }
        builder.push(")");
    }
    builder.push(" ORDER BY ");
    builder.push(order_by);
    builder.push(" LIMIT ");
    builder.push_bind(params.pagination.limit());
    builder.push(" OFFSET ");
    builder.push_bind(params.pagination.offset());
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, username, full_name, password_hash, role, email_verified, \
             verification_token, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.full_name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.email_verified)
            .bind(&user.verification_token)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_login(&self, identifier: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1) OR username = $1 LIMIT 1"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, params: &ListParams) -> RepoResult<Vec<User>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_search_and_page(
            &mut builder,
            params,
            &["email", "username", "full_name"],
            "created_at DESC",
        );
        Ok(builder.build_query_as::<User>().fetch_all(&self.pool).await?)
    }

    /// Partial update via `COALESCE`: a column is only written when the field is `Some`.
    async fn update_user(&self, id: Uuid, req: UpdateUserRequest) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET full_name = COALESCE($2, full_name), role = COALESCE($3, role), \
             updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.full_name)
            .bind(req.role.map(|role| role.as_str()))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_password(&self, id: Uuid, password_hash: String) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_verification_token(&self, id: Uuid, token: String) -> RepoResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET verification_token = $2, updated_at = NOW() \
             WHERE id = $1 AND email_verified = false",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_admins(&self) -> RepoResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn verify_email(&self, token: &str) -> RepoResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET email_verified = true, verification_token = NULL, updated_at = NOW() \
             WHERE verification_token = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_unverified_before(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM users WHERE email_verified = false AND created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    // --- REFRESH TOKENS ---

    async fn store_refresh_token(&self, record: RefreshTokenRecord) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, expires_at, revoked, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, id: Uuid) -> RepoResult<Option<RefreshTokenRecord>> {
        Ok(sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, expires_at, revoked, created_at FROM refresh_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE id = $1 AND revoked = false")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> RepoResult<u64> {
        let res = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE user_id = $1 AND revoked = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    // --- PASSWORD RESETS ---

    async fn create_password_reset(&self, reset: PasswordReset) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO password_resets (token, user_id, expires_at, used, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&reset.token)
        .bind(reset.user_id)
        .bind(reset.expires_at)
        .bind(reset.used)
        .bind(reset.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Single statement, so two concurrent resets with the same token cannot both win.
    async fn consume_password_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Uuid>> {
        Ok(sqlx::query_scalar(
            "UPDATE password_resets SET used = true \
             WHERE token = $1 AND used = false AND expires_at > $2 RETURNING user_id",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?)
    }

    // --- CLIENTS ---

    async fn create_client(&self, req: CreateClientRequest) -> RepoResult<Client> {
        let sql = format!(
            "INSERT INTO clients (id, document_number, full_name, email, phone, address, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {CLIENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.document_number)
            .bind(req.full_name)
            .bind(req.email)
            .bind(req.phone)
            .bind(req.address)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_client(&self, id: Uuid) -> RepoResult<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1");
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_clients(&self, params: &ListParams) -> RepoResult<Vec<Client>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {CLIENT_COLUMNS} FROM clients"));
        push_search_and_page(
            &mut builder,
            params,
            &["document_number", "full_name", "email"],
            "full_name ASC",
        );
        Ok(builder.build_query_as::<Client>().fetch_all(&self.pool).await?)
    }

    async fn update_client(&self, id: Uuid, req: UpdateClientRequest) -> RepoResult<Option<Client>> {
        let sql = format!(
            "UPDATE clients SET document_number = COALESCE($2, document_number), \
             full_name = COALESCE($3, full_name), email = COALESCE($4, email), \
             phone = COALESCE($5, phone), address = COALESCE($6, address), updated_at = NOW() \
             WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .bind(req.document_number)
            .bind(req.full_name)
            .bind(req.email)
            .bind(req.phone)
            .bind(req.address)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_client(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- PRODUCTS ---

    async fn create_product(&self, req: CreateProductRequest) -> RepoResult<Product> {
        let sql = format!(
            "INSERT INTO products (id, sku, name, description, price, stock, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.sku)
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.stock)
            .bind(req.active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_product(&self, id: Uuid) -> RepoResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_products(&self, params: &ListParams) -> RepoResult<Vec<Product>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_search_and_page(&mut builder, params, &["sku", "name"], "name ASC");
        Ok(builder.build_query_as::<Product>().fetch_all(&self.pool).await?)
    }

    async fn update_product(
        &self,
        id: Uuid,
        req: UpdateProductRequest,
    ) -> RepoResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET sku = COALESCE($2, sku), name = COALESCE($3, name), \
             description = COALESCE($4, description), price = COALESCE($5, price), \
             stock = COALESCE($6, stock), active = COALESCE($7, active), updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(req.sku)
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.stock)
            .bind(req.active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_product_image(&self, id: Uuid, image_key: String) -> RepoResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET image_key = $2, updated_at = NOW() WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(image_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_product(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- SERVICES ---

    async fn create_service(&self, req: CreateServiceRequest) -> RepoResult<Service> {
        let sql = format!(
            "INSERT INTO services (id, name, description, price, duration_minutes, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {SERVICE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Service>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.duration_minutes)
            .bind(req.active)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_service(&self, id: Uuid) -> RepoResult<Option<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1");
        Ok(sqlx::query_as::<_, Service>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_services(&self, params: &ListParams) -> RepoResult<Vec<Service>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {SERVICE_COLUMNS} FROM services"));
        push_search_and_page(&mut builder, params, &["name", "description"], "name ASC");
        Ok(builder.build_query_as::<Service>().fetch_all(&self.pool).await?)
    }

    async fn update_service(
        &self,
        id: Uuid,
        req: UpdateServiceRequest,
    ) -> RepoResult<Option<Service>> {
        let sql = format!(
            "UPDATE services SET name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), duration_minutes = COALESCE($5, duration_minutes), \
             active = COALESCE($6, active), updated_at = NOW() \
             WHERE id = $1 RETURNING {SERVICE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Service>(&sql)
            .bind(id)
            .bind(req.name)
            .bind(req.description)
            .bind(req.price)
            .bind(req.duration_minutes)
            .bind(req.active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_service(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- ORDERS ---

    /// create_order
    ///
    /// One transaction: verifies the client, locks every referenced product row
    /// (`FOR UPDATE`, in id order so concurrent sales never wait on each other in a cycle),
    /// snapshots catalog prices into the lines, decrements stock and inserts the header
    /// and items. Any failure rolls back.
    async fn create_order(&self, order: NewOrder) -> RepoResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        let client: Option<Uuid> = sqlx::query_scalar("SELECT id FROM clients WHERE id = $1")
            .bind(order.client_id)
            .fetch_optional(&mut *tx)
            .await?;
        if client.is_none() {
            return Err(RepositoryError::NotFound("client".to_string()));
        }

        let mut product_ids: Vec<Uuid> = order
            .items
            .iter()
            .filter(|line| line.kind == ItemKind::Product)
            .map(|line| line.item_id)
            .collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let mut products: HashMap<Uuid, Product> = HashMap::with_capacity(product_ids.len());
        if !product_ids.is_empty() {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
            );
            let rows = sqlx::query_as::<_, Product>(&sql)
                .bind(&product_ids)
                .fetch_all(&mut *tx)
                .await?;
            products.extend(rows.into_iter().map(|p| (p.id, p)));
        }

        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(order.items.len());
        // Repeated lines for the same product draw from one remaining-stock budget.
        let mut remaining: HashMap<Uuid, i32> = HashMap::with_capacity(products.len());

        for line in &order.items {
            match line.kind {
                ItemKind::Product => {
                    let product = products.get(&line.item_id).ok_or_else(|| {
                        RepositoryError::NotFound(format!("product {}", line.item_id))
                    })?;
                    if !product.active {
                        return Err(RepositoryError::Conflict(format!(
                            "product {} is inactive",
                            product.sku
                        )));
                    }
                    let left = remaining.entry(product.id).or_insert(product.stock);
                    if *left < line.quantity {
                        return Err(RepositoryError::Conflict(format!(
                            "insufficient stock for product {}",
                            product.sku
                        )));
                    }
                    *left -= line.quantity;
                    items.push(priced_item(order_id, line, product.name.clone(), product.price)?);
                }
                ItemKind::Service => {
                    let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1");
                    let service = sqlx::query_as::<_, Service>(&sql)
                        .bind(line.item_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or_else(|| RepositoryError::NotFound(format!("service {}", line.item_id)))?;
                    if !service.active {
                        return Err(RepositoryError::Conflict(format!(
                            "service {} is inactive",
                            service.name
                        )));
                    }
                    items.push(priced_item(order_id, line, service.name, service.price)?);
                }
            }
        }

        let totals = order_totals(&items, order.tax_rate_bps)?;

        for product_id in &product_ids {
            if let Some(stock) = remaining.get(product_id) {
                sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                    .bind(product_id)
                    .bind(*stock)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let sql = format!(
            "INSERT INTO orders (id, client_id, created_by, status, payment_method, subtotal, tax, total, \
             notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW()) RETURNING {ORDER_COLUMNS}"
        );
        let header = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .bind(order.client_id)
            .bind(order.created_by)
            .bind(OrderStatus::Pending.as_str())
            .bind(order.payment_method.as_str())
            .bind(totals.subtotal)
            .bind(totals.tax)
            .bind(totals.total)
            .bind(order.notes)
            .fetch_one(&mut *tx)
            .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, kind, product_id, service_id, description, \
                 quantity, unit_price, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.kind.as_str())
            .bind(item.product_id)
            .bind(item.service_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
        }

        let items = self.order_items(&mut tx, order_id).await?;
        tx.commit().await?;

        Ok(OrderDetail { order: header, items })
    }

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<OrderDetail>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(order) = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let items = self.order_items(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(OrderDetail { order, items }))
    }

    async fn list_orders(&self, query: &OrderQuery) -> RepoResult<Vec<Order>> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE true"));
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(client_id) = query.client_id {
            builder.push(" AND client_id = ");
            builder.push_bind(client_id);
        }
        builder.push(" ORDER BY receipt_number DESC LIMIT ");
        builder.push_bind(query.pagination.limit());
        builder.push(" OFFSET ");
        builder.push_bind(query.pagination.offset());
        Ok(builder.build_query_as::<Order>().fetch_all(&self.pool).await?)
    }

    /// set_order_status
    ///
    /// Locks the order row and validates the transition and the caller's right to void a
    /// completed sale against that locked status. Cancelling restocks product lines in id
    /// order; a restock that would overflow the stock column is a conflict.
    async fn set_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        can_void_completed: bool,
    ) -> RepoResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let current = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("order".to_string()))?;
        check_transition(current.status, status, can_void_completed)?;

        if status == OrderStatus::Cancelled {
            let restock: Vec<(Uuid, i64)> = sqlx::query_as(
                "SELECT product_id, SUM(quantity)::BIGINT FROM order_items \
                 WHERE order_id = $1 AND kind = 'product' \
                 GROUP BY product_id ORDER BY product_id",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            for (product_id, quantity) in restock {
                let updated = sqlx::query(
                    "UPDATE products SET stock = stock + $2, updated_at = NOW() \
                     WHERE id = $1 AND stock::BIGINT + $2 <= $3",
                )
                .bind(product_id)
                .bind(quantity)
                .bind(i64::from(i32::MAX))
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(RepositoryError::Conflict(format!(
                        "restocking product {product_id} would exceed the stock limit"
                    )));
                }
            }
        }

        let sql = format!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        let items = self.order_items(&mut tx, id).await?;
        tx.commit().await?;

        Ok(OrderDetail { order, items })
    }

    // --- DASHBOARD ---

    async fn get_stats(&self) -> RepoResult<DashboardStats> {
        Ok(sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM clients) AS total_clients,
                (SELECT COUNT(*) FROM products) AS total_products,
                (SELECT COUNT(*) FROM services) AS total_services,
                (SELECT COUNT(*) FROM orders) AS total_orders,
                (SELECT COUNT(*) FROM orders WHERE status = 'completed') AS completed_orders,
                (SELECT COALESCE(SUM(total), 0)::BIGINT FROM orders WHERE status = 'completed') AS revenue,
                (SELECT COUNT(*) FROM products WHERE active = true AND stock <= $1) AS low_stock_products
            "#,
        )
        .bind(sales::LOW_STOCK_THRESHOLD)
        .fetch_one(&self.pool)
        .await?)
    }
}
