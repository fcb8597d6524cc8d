//! Transactional storage boundary.
//!
//! The engine consumes persistence through two traits: [`Store`] for
//! committed-state point lookups and for opening an atomic unit of work, and
//! [`StoreTx`] for the operations available inside that unit. Writes made
//! through a `StoreTx` become visible only when the transaction closure
//! returns `Ok`; on `Err` nothing survives.
//!
//! The three ledger operations (`reserve`, `release`, `consume`) are the only
//! write path to inventory counters. Implementations must evaluate and apply
//! each as a single read-modify-write against current committed state: the
//! in-memory store serializes whole transactions behind one write lock, the
//! Postgres store locks the inventory row (`SELECT ... FOR UPDATE`) before
//! updating it.

pub mod in_memory;
pub mod postgres;

use thiserror::Error;

use stockgate_catalog::{Customer, Product};
use stockgate_core::{CustomerId, DomainError, OrderId, ProductId};
use stockgate_inventory::StockLevel;
use stockgate_orders::{Order, OrderStatus};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Infrastructure-level storage failure.
///
/// Deterministic business failures (`ProductNotFound`, `InsufficientStock`,
/// ...) are *not* represented here; they travel as [`DomainError`] inside
/// [`TxError`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed (I/O, connection, lock poisoning).
    #[error("storage backend failure in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// Stored data could not be decoded into domain types.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// No async runtime was available to drive the backend.
    #[error("async runtime unavailable: {0}")]
    Runtime(String),
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

/// Failure inside an atomic unit of work.
///
/// Either a deterministic domain failure (surfaced to the caller untouched)
/// or a storage failure (surfaced as `TransactionFailed`). Both abort the
/// unit with full rollback.
#[derive(Debug, Error)]
pub enum TxError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        DomainError::transaction_failed(value.to_string())
    }
}

impl From<TxError> for DomainError {
    fn from(value: TxError) -> Self {
        match value {
            TxError::Domain(e) => e,
            TxError::Store(e) => e.into(),
        }
    }
}

/// Operations available inside one atomic unit of work.
///
/// All reads observe the unit's own uncommitted writes.
pub trait StoreTx {
    fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn stock_level(&mut self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError>;

    /// Load an order with its items, holding it against concurrent
    /// modification for the rest of the unit.
    ///
    /// The status machine reads the status and then acts on it; without the
    /// hold, two concurrent transitions on one order could both observe the
    /// pre-terminal status and both apply their stock adjustments.
    fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Atomically increment `reserved` for a product, failing with
    /// `ProductNotFound` or `InsufficientStock`.
    fn reserve(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError>;

    /// Decrement `reserved`, floored at zero.
    fn release(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError>;

    /// Decrement both `on_hand` and `reserved`; `on_hand` must not go
    /// negative.
    fn consume(&mut self, product_id: ProductId, qty: u32) -> Result<StockLevel, TxError>;

    /// Persist a new order and its items.
    fn insert_order(&mut self, order: &Order) -> Result<(), TxError>;

    /// Persist a status change on an existing order.
    fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), TxError>;
}

/// Transaction coordinator + committed-state read access.
///
/// Injected explicitly into the service layer; there is no ambient global
/// handle to storage anywhere in the engine.
pub trait Store: Send + Sync {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Run `f` as one atomic unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`,
    /// propagating the originating failure. Implementations may block
    /// waiting for row locks for the duration of the unit.
    fn transaction<'s, T, F>(&'s self, f: F) -> Result<T, TxError>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T, TxError>;

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError>;

    /// Load an order with its items.
    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
}

impl<S> Store for std::sync::Arc<S>
where
    S: Store,
{
    type Tx<'a>
        = S::Tx<'a>
    where
        Self: 'a;

    fn transaction<'s, T, F>(&'s self, f: F) -> Result<T, TxError>
    where
        F: FnOnce(&mut Self::Tx<'s>) -> Result<T, TxError>,
    {
        (**self).transaction(f)
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id)
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        (**self).customer(id)
    }

    fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        (**self).stock_level(product_id)
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).order(id)
    }
}
