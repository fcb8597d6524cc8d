//! `stockgate-catalog` — product catalog and customer records.
//!
//! Catalog entities are external collaborators of the order engine: products
//! contribute the price snapshot at order time, customers are a foreign key
//! on orders. Neither has lifecycle interaction with the engine beyond that.

pub mod customer;
pub mod product;

pub use customer::Customer;
pub use product::Product;
