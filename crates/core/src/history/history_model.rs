//! Trade history domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::history_constants::*;
use crate::lots::LotKey;

/// Kind of event recorded in the trade history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeType {
    Buy,
    Sell,
    ReconcileIn,
    ReconcileOut,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => TRADE_TYPE_BUY,
            TradeType::Sell => TRADE_TYPE_SELL,
            TradeType::ReconcileIn => TRADE_TYPE_RECONCILE_IN,
            TradeType::ReconcileOut => TRADE_TYPE_RECONCILE_OUT,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            s if s == TRADE_TYPE_BUY => Ok(TradeType::Buy),
            s if s == TRADE_TYPE_SELL => Ok(TradeType::Sell),
            s if s == TRADE_TYPE_RECONCILE_IN => Ok(TradeType::ReconcileIn),
            s if s == TRADE_TYPE_RECONCILE_OUT => Ok(TradeType::ReconcileOut),
            _ => Err(format!("Unknown trade type: {}", s)),
        }
    }
}

/// One recorded trade event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub account_id: String,
    pub market: String,
    pub base: String,
    pub asset_type: String,
    pub trade_type: TradeType,
    pub units: Decimal,
    /// Price per unit in `base` the trade was executed (or valued) at.
    pub rate: Decimal,
    /// `units × rate`.
    pub total: Decimal,
    /// Acquisition cost of the consumed lots, for disposals only.
    pub cost_basis: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        key: &LotKey,
        trade_type: TradeType,
        units: Decimal,
        rate: Decimal,
        total: Decimal,
    ) -> Self {
        HistoryEntry {
            id: Uuid::now_v7().to_string(),
            account_id: key.account_id.clone(),
            market: key.market.clone(),
            base: key.base.clone(),
            asset_type: key.asset_type.clone(),
            trade_type,
            units,
            rate,
            total,
            cost_basis: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_cost_basis(mut self, cost_basis: Decimal) -> Self {
        self.cost_basis = Some(cost_basis);
        self
    }

    /// Proceeds minus acquisition cost; `None` for acquisitions.
    pub fn realized_gain(&self) -> Option<Decimal> {
        self.cost_basis.map(|basis| self.total - basis)
    }
}

/// Narrows a history listing. `None` fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    pub base: Option<String>,
    pub asset_type: Option<String>,
}
