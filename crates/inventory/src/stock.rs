use serde::Serialize;

use stockgate_core::{DomainError, DomainResult, ProductId};

/// Inventory counters for one product.
///
/// Invariant: `0 <= reserved <= on_hand` at every committed state. The
/// fields are private so the invariant can only be affected through the
/// three ledger operations, each of which either upholds it or fails.
/// Operations return the updated counters instead of mutating in place;
/// the storage layer decides when (and whether) the new value commits.
///
/// Serialize-only: rehydration goes through [`StockLevel::new`] so the
/// invariant is re-checked on every load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    product_id: ProductId,
    /// Total physical stock currently held.
    on_hand: u32,
    /// Portion of `on_hand` promised to orders not yet delivered or cancelled.
    reserved: u32,
}

impl StockLevel {
    pub fn new(product_id: ProductId, on_hand: u32, reserved: u32) -> DomainResult<Self> {
        if reserved > on_hand {
            return Err(DomainError::validation(format!(
                "reserved ({reserved}) cannot exceed on_hand ({on_hand})"
            )));
        }
        Ok(Self {
            product_id,
            on_hand,
            reserved,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Quantity orderable right now.
    pub fn available(&self) -> u32 {
        self.on_hand - self.reserved
    }

    /// Promise `qty` units of stock to an order.
    ///
    /// Fails with `InsufficientStock` when fewer than `qty` units are
    /// available. The caller is responsible for evaluating and applying the
    /// result as a single atomic step against current committed state.
    pub fn reserve(&self, qty: u32) -> DomainResult<Self> {
        if qty == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.available() < qty {
            return Err(DomainError::InsufficientStock {
                product_id: self.product_id,
                requested: qty,
                available: self.available(),
            });
        }
        Ok(Self {
            reserved: self.reserved + qty,
            ..*self
        })
    }

    /// Return `qty` reserved units to the available pool.
    ///
    /// Infallible: `reserved` is floored at zero, because a compensating
    /// release must never fail the surrounding status transition.
    pub fn release(&self, qty: u32) -> Self {
        Self {
            reserved: self.reserved.saturating_sub(qty),
            ..*self
        }
    }

    /// Physically deduct `qty` units and clear their reservation.
    ///
    /// `reserved` is floored at zero. `on_hand` must not go negative; under
    /// correct usage it cannot, because consume is only called for
    /// already-reserved quantity.
    pub fn consume(&self, qty: u32) -> DomainResult<Self> {
        if qty == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let on_hand = self.on_hand.checked_sub(qty).ok_or(
            DomainError::InsufficientStock {
                product_id: self.product_id,
                requested: qty,
                available: self.available(),
            },
        )?;
        Ok(Self {
            product_id: self.product_id,
            on_hand,
            reserved: self.reserved.saturating_sub(qty),
        })
    }
}
