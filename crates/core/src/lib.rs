//! Lotbook Core - lot ledger, trade history and trade services.
//!
//! This crate contains the lot-accounting rules for virtual-currency holdings.
//! It is database-agnostic and defines traits that are implemented
//! by the `storage-sqlite` crate.

pub mod constants;
pub mod errors;
pub mod history;
pub mod lots;
pub mod trades;

// Re-export the ledger surface
pub use lots::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
