//! Trades module - account-level buy, sell and balance sync on top of the lot ledger.

mod trades_model;
mod trades_service;
mod trades_traits;

pub use trades_model::*;
pub use trades_service::TradeService;
pub use trades_traits::TradeServiceTrait;

#[cfg(test)]
mod trades_service_tests;
