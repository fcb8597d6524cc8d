//! `stockgate-inventory` — the stock ledger.
//!
//! Sole owner of the per-product `on_hand`/`reserved` counters. Every
//! mutation is one of three operations (`reserve`, `release`, `consume`);
//! there is no raw field write path.

pub mod stock;

pub use stock::StockLevel;
