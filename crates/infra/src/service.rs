//! Order orchestration: the order builder and the order status machine.

use chrono::Utc;
use tracing::{debug, info};

use stockgate_core::{CustomerId, DomainError, DomainResult, OrderId, ProductId};
use stockgate_orders::{Order, OrderItem, OrderLineView, OrderStatus, OrderView};

use crate::store::{Store, StoreTx};

/// One requested order line: which product, how many units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub qty: u32,
}

/// Order placement and lifecycle service.
///
/// Owns no state beyond the injected store; safe to share across threads.
/// Every order-affecting call is one atomic unit of work: either the order
/// plus all of its reservations commit together, or nothing does.
#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Place an order for a customer.
    ///
    /// Validates the requested quantities against committed stock first (a
    /// fast-fail pre-check; nothing is written if it trips), then reserves
    /// every line and creates the `PENDING` order in one transaction. If any
    /// reservation races to insufficiency inside the transaction, the whole
    /// unit rolls back: no order and no partial reservation survives.
    pub fn create_order(
        &self,
        customer_id: CustomerId,
        items: &[OrderItemRequest],
    ) -> DomainResult<Order> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "order must contain at least one item",
            ));
        }
        for request in items {
            if request.qty == 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
        }

        // Pre-check against committed state and snapshot prices. The
        // authoritative sufficiency guard is the reserve inside the
        // transaction below; this pass only rejects obviously doomed orders
        // before touching anything.
        let mut lines = Vec::with_capacity(items.len());
        for request in items {
            let stock = self
                .store
                .stock_level(request.product_id)?
                .ok_or(DomainError::ProductNotFound(request.product_id))?;
            if stock.available() < request.qty {
                return Err(DomainError::InsufficientStock {
                    product_id: request.product_id,
                    requested: request.qty,
                    available: stock.available(),
                });
            }
            let product = self
                .store
                .product(request.product_id)?
                .ok_or(DomainError::ProductNotFound(request.product_id))?;
            lines.push(OrderItem::new(
                request.product_id,
                request.qty,
                product.price(),
            )?);
        }

        let order = Order::place(OrderId::new(), customer_id, Utc::now(), lines)?;

        // Reservations are acquired in ascending product id order so that
        // concurrent orders over overlapping product sets never hold row
        // locks in conflicting orders (circular wait).
        let mut reservations: Vec<(ProductId, u32)> = items
            .iter()
            .map(|request| (request.product_id, request.qty))
            .collect();
        reservations.sort_by_key(|&(product_id, _)| product_id);

        let created = self.store.transaction(|tx| {
            for &(product_id, qty) in &reservations {
                tx.reserve(product_id, qty)?;
            }
            tx.insert_order(&order)?;
            Ok(order.clone())
        })?;

        info!(
            order_id = %created.id(),
            customer_id = %customer_id,
            total = created.total(),
            lines = created.items().len(),
            "order placed"
        );
        Ok(created)
    }

    /// Transition an order to a new status, adjusting stock as a side
    /// effect of the transition.
    ///
    /// `Cancelled` releases every line's reservation back to the available
    /// pool; `Delivered` physically deducts the stock and clears its
    /// reservation. Counter adjustments and the status write land in one
    /// atomic unit. Terminal orders reject every further transition, so
    /// stock can never be double-released or double-consumed.
    pub fn update_order_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
    ) -> DomainResult<Order> {
        let updated = self.store.transaction(|tx| {
            let mut order = tx
                .order(order_id)?
                .ok_or(DomainError::OrderNotFound(order_id))?;
            order.status().ensure_transition_to(next)?;

            // Same fixed adjustment order as the builder's reservations.
            let mut items: Vec<(ProductId, u32)> = order
                .items()
                .iter()
                .map(|item| (item.product_id, item.qty))
                .collect();
            items.sort_by_key(|&(product_id, _)| product_id);

            match next {
                OrderStatus::Cancelled => {
                    for &(product_id, qty) in &items {
                        tx.release(product_id, qty)?;
                    }
                }
                OrderStatus::Delivered => {
                    for &(product_id, qty) in &items {
                        tx.consume(product_id, qty)?;
                    }
                }
                OrderStatus::Pending => {}
            }

            tx.set_order_status(order_id, next)?;
            order.set_status(next);
            Ok(order)
        })?;

        info!(order_id = %order_id, status = %next, "order status updated");
        Ok(updated)
    }

    /// Load an order populated for display: its customer and every line's
    /// product record.
    pub fn order_details(&self, order_id: OrderId) -> DomainResult<OrderView> {
        let order = self
            .store
            .order(order_id)?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let customer = self.store.customer(order.customer_id())?.ok_or_else(|| {
            DomainError::transaction_failed(format!(
                "customer record missing for order {order_id}"
            ))
        })?;

        let mut lines = Vec::with_capacity(order.items().len());
        for item in order.items() {
            let product = self
                .store
                .product(item.product_id)?
                .ok_or(DomainError::ProductNotFound(item.product_id))?;
            lines.push(OrderLineView {
                item: item.clone(),
                product,
            });
        }

        debug!(order_id = %order_id, lines = lines.len(), "order view assembled");
        Ok(OrderView {
            order,
            customer,
            lines,
        })
    }
}
