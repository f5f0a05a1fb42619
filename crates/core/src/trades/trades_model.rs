//! Request and view models for the trade service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::lots::{Lot, PriceQuote, RemovalResult};

/// Holdings grouped by base currency, then asset.
pub type HoldingsByBase = BTreeMap<String, BTreeMap<String, Vec<Lot>>>;

/// A buy or sell of one asset against a base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub base: String,
    pub asset_type: String,
    pub units: Decimal,
    pub rate: Decimal,
}

/// Balances observed on the market for every asset held against `base`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub base: String,
    pub balances: HashMap<String, Decimal>,
    #[serde(default)]
    pub prices: HashMap<String, PriceQuote>,
}

/// Result of a sell: the lots consumed and what they realized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaleResult {
    pub removal: RemovalResult,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub realized_gain: Decimal,
}

/// Groups a flat lot listing by base and asset, keeping per-asset order.
pub fn group_by_base(lots: Vec<Lot>) -> HoldingsByBase {
    let mut grouped = HoldingsByBase::new();
    for lot in lots {
        grouped
            .entry(lot.base.clone())
            .or_default()
            .entry(lot.asset_type.clone())
            .or_default()
            .push(lot);
    }
    grouped
}
