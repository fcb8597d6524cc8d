use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use stockgate_catalog::{Customer, Product};
use stockgate_core::{CustomerId, DomainError, OrderId, ProductId};
use stockgate_inventory::StockLevel;
use stockgate_orders::{Order, OrderStatus};

use super::{Store, StoreError, StoreTx, TxError};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    stock: HashMap<ProductId, StockLevel>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Transactions take the write lock for their whole
/// duration and mutate a working copy of the state; the copy replaces the
/// committed state only on `Ok`. Holding the lock serializes concurrent
/// units of work, which gives each ledger operation the required
/// read-modify-write atomicity against current committed state.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product (bootstrap/test seeding).
    pub fn seed_product(&self, product: Product) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        state.products.insert(product.id(), product);
        Ok(())
    }

    /// Insert or replace a customer record (bootstrap/test seeding).
    pub fn seed_customer(&self, customer: Customer) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        state.customers.insert(customer.id(), customer);
        Ok(())
    }

    /// Insert or replace the inventory counters for a product
    /// (bootstrap/test seeding).
    pub fn seed_stock(&self, level: StockLevel) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        state.stock.insert(level.product_id(), level);
        Ok(())
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("write_state", "state lock poisoned"))
    }
}

/// One in-flight unit of work over the in-memory state.
pub struct InMemoryTx<'a> {
    guard: RwLockWriteGuard<'a, State>,
    working: State,
}

impl StoreTx for InMemoryTx<'_> {
    fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(&id).cloned())
    }

    fn stock_level(&mut self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        Ok(self.working.stock.get(&product_id).copied())
    }

    fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    fn reserve(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let stock = self
            .working
            .stock
            .get(&product_id)
            .copied()
            .ok_or(DomainError::ProductNotFound(product_id))?;
        let updated = stock.reserve(qty)?;
        self.working.stock.insert(product_id, updated);
        Ok(updated)
    }

    fn release(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let stock = self
            .working
            .stock
            .get(&product_id)
            .copied()
            .ok_or(DomainError::ProductNotFound(product_id))?;
        let updated = stock.release(qty);
        self.working.stock.insert(product_id, updated);
        Ok(updated)
    }

    fn consume(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError> {
        let stock = self
            .working
            .stock
            .get(&product_id)
            .copied()
            .ok_or(DomainError::ProductNotFound(product_id))?;
        let updated = stock.consume(qty)?;
        self.working.stock.insert(product_id, updated);
        Ok(updated)
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), TxError> {
        if self.working.orders.contains_key(&order.id()) {
            return Err(StoreError::backend(
                "insert_order",
                format!("order already exists: {}", order.id()),
            )
            .into());
        }
        self.working.orders.insert(order.id(), order.clone());
        Ok(())
    }

    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), TxError> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or(DomainError::OrderNotFound(id))?;
        order.set_status(status);
        Ok(())
    }
}

impl Store for InMemoryStore {
    type Tx<'a>
        = InMemoryTx<'a>
    where
        Self: 'a;

    fn transaction<'s, T, F>(&'s self, f: F) -> Result<T, TxError>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T, TxError>,
    {
        let guard = self
            .state
            .write()
            .map_err(|_| StoreError::backend("transaction", "state lock poisoned"))?;
        let working = guard.clone();
        let mut tx = InMemoryTx { guard, working };

        // The working copy is dropped on failure; committed state is
        // untouched until the closure succeeds.
        let value = f(&mut tx)?;
        *tx.guard = tx.working;
        Ok(value)
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::backend("product", "state lock poisoned"))?;
        Ok(state.products.get(&id).cloned())
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::backend("customer", "state lock poisoned"))?;
        Ok(state.customers.get(&id).cloned())
    }

    fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::backend("stock_level", "state lock poisoned"))?;
        Ok(state.stock.get(&product_id).copied())
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::backend("order", "state lock poisoned"))?;
        Ok(state.orders.get(&id).cloned())
    }
}
