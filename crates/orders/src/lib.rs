//! `stockgate-orders` — order records and their status lifecycle.
//!
//! An order owns its line items: they share one lifetime and one atomic unit
//! of creation, and the item set is fixed once the order exists. Status is
//! the only field that changes afterwards.

pub mod order;
pub mod status;

pub use order::{Order, OrderItem, OrderLineView, OrderView};
pub use status::OrderStatus;
