//! Postgres-backed transactional store.
//!
//! Ledger operations lock the inventory row (`SELECT ... FOR UPDATE`) inside
//! the surrounding transaction before writing the new counters, so the
//! sufficiency check and the counter increment form one uninterruptible
//! critical section per product row. Two concurrent orders over the same
//! product cannot both observe sufficient stock.
//!
//! The `Store` trait is synchronous while sqlx is async; operations are
//! bridged with `tokio::runtime::Handle`, so the store must be used from
//! within a tokio runtime context. The schema lives in `schema.sql` next to
//! this crate; its CHECK constraints mirror the counter invariants as a
//! second line of defense.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use stockgate_catalog::{Customer, Product};
use stockgate_core::{CustomerId, DomainError, OrderId, ProductId};
use stockgate_inventory::StockLevel;
use stockgate_orders::{Order, OrderItem, OrderStatus};

use super::{Store, StoreError, StoreTx, TxError};

/// Postgres-backed store.
///
/// Cloneable; all operations run on the shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut conn = self.acquire().await?;
        query_product(&mut conn, id).await
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    pub async fn fetch_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let mut conn = self.acquire().await?;
        query_customer(&mut conn, id).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn fetch_stock_level(
        &self,
        product_id: ProductId,
    ) -> Result<Option<StockLevel>, StoreError> {
        let mut conn = self.acquire().await?;
        query_stock(&mut conn, product_id, false).await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.acquire().await?;
        query_order(&mut conn, id, false).await
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire connection", e))
    }
}

/// One in-flight unit of work on a Postgres connection.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    handle: tokio::runtime::Handle,
}

impl StoreTx for PostgresTx {
    fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(query_product(conn, id))
    }

    fn stock_level(&mut self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(query_stock(conn, product_id, false))
    }

    fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(query_order(conn, id, true))
    }

    fn reserve(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(async move {
            let stock = query_stock(&mut *conn, product_id, true)
                .await?
                .ok_or(DomainError::ProductNotFound(product_id))?;
            let updated = stock.reserve(qty)?;
            write_stock(&mut *conn, updated).await?;
            Ok(updated)
        })
    }

    fn release(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(async move {
            let stock = query_stock(&mut *conn, product_id, true)
                .await?
                .ok_or(DomainError::ProductNotFound(product_id))?;
            let updated = stock.release(qty);
            write_stock(&mut *conn, updated).await?;
            Ok(updated)
        })
    }

    fn consume(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(async move {
            let stock = query_stock(&mut *conn, product_id, true)
                .await?
                .ok_or(DomainError::ProductNotFound(product_id))?;
            let updated = stock.consume(qty)?;
            write_stock(&mut *conn, updated).await?;
            Ok(updated)
        })
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), TxError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(async move {
            let total = i64::try_from(order.total())
                .map_err(|_| StoreError::corrupt("order total exceeds storable range"))?;

            sqlx::query(
                "INSERT INTO orders (order_id, customer_id, status, total, placed_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::from(order.id()))
            .bind(Uuid::from(order.customer_id()))
            .bind(order.status().as_str())
            .bind(total)
            .bind(order.placed_at())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert order", e))?;

            for (idx, item) in order.items().iter().enumerate() {
                let price = i64::try_from(item.price_at_purchase)
                    .map_err(|_| StoreError::corrupt("item price exceeds storable range"))?;

                sqlx::query(
                    "INSERT INTO order_items (order_id, line_no, product_id, qty, price_at_purchase) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::from(order.id()))
                .bind((idx + 1) as i32)
                .bind(Uuid::from(item.product_id))
                .bind(i64::from(item.qty))
                .bind(price)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("insert order item", e))?;
            }

            Ok(())
        })
    }

    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), TxError> {
        let handle = self.handle.clone();
        let conn: &mut PgConnection = &mut self.tx;
        handle.block_on(async move {
            let result = sqlx::query("UPDATE orders SET status = $2 WHERE order_id = $1")
                .bind(Uuid::from(id))
                .bind(status.as_str())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("update order status", e))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::OrderNotFound(id).into());
            }
            Ok(())
        })
    }
}

impl Store for PostgresStore {
    type Tx<'a>
        = PostgresTx
    where
        Self: 'a;

    fn transaction<'s, T, F>(&'s self, f: F) -> Result<T, TxError>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T, TxError>,
    {
        let handle = runtime_handle()?;
        let tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin transaction", e))?;
        let mut ptx = PostgresTx {
            tx,
            handle: handle.clone(),
        };

        match f(&mut ptx) {
            Ok(value) => {
                handle
                    .block_on(ptx.tx.commit())
                    .map_err(|e| map_sqlx_error("commit", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.block_on(ptx.tx.rollback()) {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        runtime_handle()?.block_on(self.fetch_product(id))
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        runtime_handle()?.block_on(self.fetch_customer(id))
    }

    fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        runtime_handle()?.block_on(self.fetch_stock_level(product_id))
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        runtime_handle()?.block_on(self.fetch_order(id))
    }
}

fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::runtime(
            "PostgresStore requires a tokio runtime; call from within a runtime context",
        )
    })
}

fn map_sqlx_error(operation: &'static str, e: sqlx::Error) -> StoreError {
    StoreError::backend(operation, e.to_string())
}

async fn query_product(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, StoreError> {
    let row: Option<ProductRow> =
        sqlx::query_as("SELECT product_id, sku, name, price, active FROM products WHERE product_id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("select product", e))?;

    row.map(ProductRow::into_product).transpose()
}

async fn query_customer(
    conn: &mut PgConnection,
    id: CustomerId,
) -> Result<Option<Customer>, StoreError> {
    let row: Option<CustomerRow> =
        sqlx::query_as("SELECT customer_id, name, email, phone FROM customers WHERE customer_id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("select customer", e))?;

    row.map(CustomerRow::into_customer).transpose()
}

async fn query_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    for_update: bool,
) -> Result<Option<StockLevel>, StoreError> {
    let sql = if for_update {
        "SELECT product_id, on_hand, reserved FROM inventory WHERE product_id = $1 FOR UPDATE"
    } else {
        "SELECT product_id, on_hand, reserved FROM inventory WHERE product_id = $1"
    };

    let row: Option<StockRow> = sqlx::query_as(sql)
        .bind(Uuid::from(product_id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("select inventory", e))?;

    row.map(StockRow::into_level).transpose()
}

async fn write_stock(conn: &mut PgConnection, level: StockLevel) -> Result<(), StoreError> {
    sqlx::query("UPDATE inventory SET on_hand = $2, reserved = $3 WHERE product_id = $1")
        .bind(Uuid::from(level.product_id()))
        .bind(i64::from(level.on_hand()))
        .bind(i64::from(level.reserved()))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update inventory", e))?;
    Ok(())
}

async fn query_order(
    conn: &mut PgConnection,
    id: OrderId,
    for_update: bool,
) -> Result<Option<Order>, StoreError> {
    // Transition checks read the status and then act on it; inside a
    // transaction the row must be locked so a concurrent transition cannot
    // also observe the pre-terminal status.
    let sql = if for_update {
        "SELECT order_id, customer_id, status, total, placed_at FROM orders WHERE order_id = $1 FOR UPDATE"
    } else {
        "SELECT order_id, customer_id, status, total, placed_at FROM orders WHERE order_id = $1"
    };

    let row: Option<OrderRow> = sqlx::query_as(sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("select order", e))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let item_rows: Vec<OrderItemRow> =
        sqlx::query_as("SELECT product_id, qty, price_at_purchase FROM order_items WHERE order_id = $1 ORDER BY line_no")
            .bind(Uuid::from(id))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("select order items", e))?;

    let items = item_rows
        .into_iter()
        .map(OrderItemRow::into_item)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(row.into_order(items)?))
}

#[derive(Debug)]
struct ProductRow {
    product_id: Uuid,
    sku: String,
    name: String,
    price: i64,
    active: bool,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_id: row.try_get("product_id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            active: row.try_get("active")?,
        })
    }
}

impl ProductRow {
    fn into_product(self) -> Result<Product, StoreError> {
        let price = u64::try_from(self.price)
            .map_err(|_| StoreError::corrupt(format!("negative price for product {}", self.product_id)))?;
        Ok(Product::from_parts(
            ProductId::from_uuid(self.product_id),
            self.sku,
            self.name,
            price,
            self.active,
        ))
    }
}

#[derive(Debug)]
struct CustomerRow {
    customer_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomerRow {
            customer_id: row.try_get("customer_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
        })
    }
}

impl CustomerRow {
    fn into_customer(self) -> Result<Customer, StoreError> {
        let mut customer = Customer::new(CustomerId::from_uuid(self.customer_id), self.name)
            .map_err(|e| StoreError::corrupt(e.to_string()))?;
        if let Some(email) = self.email {
            customer = customer.with_email(email);
        }
        if let Some(phone) = self.phone {
            customer = customer.with_phone(phone);
        }
        Ok(customer)
    }
}

#[derive(Debug)]
struct StockRow {
    product_id: Uuid,
    on_hand: i64,
    reserved: i64,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            product_id: row.try_get("product_id")?,
            on_hand: row.try_get("on_hand")?,
            reserved: row.try_get("reserved")?,
        })
    }
}

impl StockRow {
    fn into_level(self) -> Result<StockLevel, StoreError> {
        let on_hand = u32::try_from(self.on_hand).map_err(|_| {
            StoreError::corrupt(format!("on_hand out of range for product {}", self.product_id))
        })?;
        let reserved = u32::try_from(self.reserved).map_err(|_| {
            StoreError::corrupt(format!("reserved out of range for product {}", self.product_id))
        })?;
        StockLevel::new(ProductId::from_uuid(self.product_id), on_hand, reserved)
            .map_err(|e| StoreError::corrupt(e.to_string()))
    }
}

#[derive(Debug)]
struct OrderRow {
    order_id: Uuid,
    customer_id: Uuid,
    status: String,
    total: i64,
    placed_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            status: row.try_get("status")?,
            total: row.try_get("total")?,
            placed_at: row.try_get("placed_at")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e: DomainError| StoreError::corrupt(e.to_string()))?;
        let total = u64::try_from(self.total)
            .map_err(|_| StoreError::corrupt(format!("negative total for order {}", self.order_id)))?;
        Ok(Order::from_parts(
            OrderId::from_uuid(self.order_id),
            CustomerId::from_uuid(self.customer_id),
            status,
            total,
            self.placed_at,
            items,
        ))
    }
}

#[derive(Debug)]
struct OrderItemRow {
    product_id: Uuid,
    qty: i64,
    price_at_purchase: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            product_id: row.try_get("product_id")?,
            qty: row.try_get("qty")?,
            price_at_purchase: row.try_get("price_at_purchase")?,
        })
    }
}

impl OrderItemRow {
    fn into_item(self) -> Result<OrderItem, StoreError> {
        let qty = u32::try_from(self.qty).map_err(|_| {
            StoreError::corrupt(format!("qty out of range for product {}", self.product_id))
        })?;
        let price = u64::try_from(self.price_at_purchase).map_err(|_| {
            StoreError::corrupt(format!("negative price snapshot for product {}", self.product_id))
        })?;
        OrderItem::new(ProductId::from_uuid(self.product_id), qty, price)
            .map_err(|e| StoreError::corrupt(e.to_string()))
    }
}
