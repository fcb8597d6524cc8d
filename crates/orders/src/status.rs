use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stockgate_core::{DomainError, DomainResult};

/// Order status lifecycle.
///
/// A closed enumeration: unknown status strings are rejected at parse time
/// rather than silently accepted as no-op states. `Cancelled` and
/// `Delivered` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Cancelled,
    Delivered,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    /// Whether the status machine may move from `self` to `next`.
    ///
    /// Terminal states reject every transition, so re-cancelling or
    /// re-delivering can never double-apply stock adjustments.
    pub fn can_transition_to(self, _next: OrderStatus) -> bool {
        !self.is_terminal()
    }

    /// Guard form of [`can_transition_to`](Self::can_transition_to).
    pub fn ensure_transition_to(self, next: OrderStatus) -> DomainResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self, next))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown order status: '{other}'"
            ))),
        }
    }
}
