use chrono::{DateTime, Utc};
use serde::Serialize;

use stockgate_catalog::{Customer, Product};
use stockgate_core::{CustomerId, DomainError, DomainResult, OrderId, ProductId};

use crate::status::OrderStatus;

/// Order line: product, quantity, price snapshot.
///
/// `price_at_purchase` is the unit price recorded at order time, immune to
/// later catalog price changes. Lines are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub qty: u32,
    /// Unit price snapshot in the smallest currency unit (e.g., cents).
    pub price_at_purchase: u64,
}

impl OrderItem {
    pub fn new(product_id: ProductId, qty: u32, price_at_purchase: u64) -> DomainResult<Self> {
        if qty == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self {
            product_id,
            qty,
            price_at_purchase,
        })
    }

    pub fn line_total(&self) -> u64 {
        u64::from(self.qty) * self.price_at_purchase
    }
}

/// A placed order with its line items.
///
/// Created only by the order builder; status mutated only by the status
/// machine; never hard-deleted. The item set is fixed at creation.
///
/// Serialize-only: rehydration goes through [`Order::from_parts`], so the
/// total cannot be forged through a deserializer bypassing [`Order::place`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: OrderStatus,
    /// Sum of `qty * price_at_purchase` over the items.
    total: u64,
    placed_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    /// Assemble a new `PENDING` order, computing the total from its lines.
    pub fn place(
        id: OrderId,
        customer_id: CustomerId,
        placed_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "order must contain at least one item",
            ));
        }

        let mut total: u64 = 0;
        for item in &items {
            let line = u64::from(item.qty)
                .checked_mul(item.price_at_purchase)
                .ok_or_else(|| DomainError::validation("line total overflows"))?;
            total = total
                .checked_add(line)
                .ok_or_else(|| DomainError::validation("order total overflows"))?;
        }

        Ok(Self {
            id,
            customer_id,
            status: OrderStatus::Pending,
            total,
            placed_at,
            items,
        })
    }

    /// Reconstruct an order from stored fields (no total re-computation).
    pub fn from_parts(
        id: OrderId,
        customer_id: CustomerId,
        status: OrderStatus,
        total: u64,
        placed_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            total,
            placed_at,
            items,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Apply an already-validated status transition.
    ///
    /// Reserved for the status machine; it must check
    /// [`OrderStatus::ensure_transition_to`] and drive the corresponding
    /// ledger adjustments in the same atomic unit.
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }
}

/// Order populated for display: customer and per-line product records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub customer: Customer,
    pub lines: Vec<OrderLineView>,
}

/// One populated order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    pub item: OrderItem,
    pub product: Product,
}
