//! Domain error model.

use thiserror::Error;

use crate::id::{OrderId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure kind a caller can observe from the engine. Each variant is
/// distinguishable enough to render an appropriate message ("out of stock",
/// "order not found") without exposing internal state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// No inventory/catalog row exists for the referenced product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds the orderable stock (`on_hand - reserved`).
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// A status transition out of a terminal state was attempted.
    #[error("invalid order transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A value failed validation (e.g. malformed input, empty item list).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The atomic unit of work could not complete (lock timeout, storage
    /// failure). Nothing was committed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transaction_failed(msg: impl Into<String>) -> Self {
        Self::TransactionFailed(msg.into())
    }

    pub fn invalid_transition(
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
