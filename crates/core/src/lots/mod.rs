//! Lots module - lot models, the lot ledger and its storage contract.

pub mod consumption;
mod lots_model;
mod lots_service;
mod lots_traits;

pub use consumption::{consumption_order, plan_removal};
pub use lots_model::*;
pub use lots_service::{LedgerConfig, LotLedger};
pub use lots_traits::{LotLedgerTrait, LotRepositoryTrait};

#[cfg(test)]
pub(crate) mod test_support;
