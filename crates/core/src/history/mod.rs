//! Trade history module - append-only log of buys, sells and balance syncs.

mod history_constants;
mod history_model;
mod history_traits;

pub use history_constants::*;
pub use history_model::{HistoryEntry, HistoryFilter, TradeType};
pub use history_traits::HistoryRepositoryTrait;
