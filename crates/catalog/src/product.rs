use serde::Serialize;

use stockgate_core::{DomainError, DomainResult, ProductId};

/// Catalog product.
///
/// Immutable for the order engine except `price`, which is read at order
/// time and snapshotted onto the order line. Later price changes never
/// retroactively affect existing orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    /// Unit price in the smallest currency unit (e.g., cents).
    price: u64,
    active: bool,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        price: u64,
    ) -> DomainResult<Self> {
        let sku = sku.into();
        let name = name.into();

        if sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(Self {
            id,
            sku,
            name,
            price,
            active: true,
        })
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Update the catalog price. Existing orders keep their snapshot.
    pub fn set_price(&mut self, price: u64) {
        self.price = price;
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Reconstruct a product from stored fields (no validation re-run).
    pub fn from_parts(
        id: ProductId,
        sku: String,
        name: String,
        price: u64,
        active: bool,
    ) -> Self {
        Self {
            id,
            sku,
            name,
            price,
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_active_product() {
        let product = Product::new(ProductId::new(), "SKU-1", "Widget", 1250).unwrap();
        assert!(product.is_active());
        assert_eq!(product.price(), 1250);
        assert_eq!(product.sku(), "SKU-1");
    }

    #[test]
    fn rejects_blank_sku() {
        let err = Product::new(ProductId::new(), "   ", "Widget", 100).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_blank_name() {
        let err = Product::new(ProductId::new(), "SKU-1", "", 100).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn set_price_updates_catalog_price() {
        let mut product = Product::new(ProductId::new(), "SKU-1", "Widget", 100).unwrap();
        product.set_price(175);
        assert_eq!(product.price(), 175);
    }
}
