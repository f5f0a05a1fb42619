//! Lot domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{Error, Result};

/// Identifies one LotSet: every lot for an account, market, base currency and asset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct LotKey {
    pub account_id: String,
    pub market: String,
    pub base: String,
    pub asset_type: String,
}

impl LotKey {
    pub fn new(
        account_id: impl Into<String>,
        market: impl Into<String>,
        base: impl Into<String>,
        asset_type: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            market: market.into(),
            base: base.into(),
            asset_type: asset_type.into(),
        }
    }
}

impl fmt::Display for LotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}-{}",
            self.account_id, self.market, self.base, self.asset_type
        )
    }
}

/// Key prefix shared by every asset held against one base currency.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BaseKey {
    pub account_id: String,
    pub market: String,
    pub base: String,
}

impl BaseKey {
    pub fn new(
        account_id: impl Into<String>,
        market: impl Into<String>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            market: market.into(),
            base: base.into(),
        }
    }

    pub fn for_asset(&self, asset_type: &str) -> LotKey {
        LotKey {
            account_id: self.account_id.clone(),
            market: self.market.clone(),
            base: self.base.clone(),
            asset_type: asset_type.to_string(),
        }
    }
}

/// A discrete acquisition of `units` at a fixed `rate`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: String,
    pub base: String,
    pub asset_type: String,
    /// Always strictly positive while the lot is stored.
    pub units: Decimal,
    /// Price of one unit in `base` at acquisition. Never changes.
    pub rate: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    /// Creates a lot with a fresh, time-ordered identifier.
    pub fn new(key: &LotKey, units: Decimal, rate: Decimal) -> Self {
        Lot {
            id: Uuid::now_v7().to_string(),
            base: key.base.clone(),
            asset_type: key.asset_type.clone(),
            units,
            rate,
            created_at: Utc::now(),
        }
    }

    /// Acquisition cost of the units still held.
    pub fn cost_basis(&self) -> Result<Decimal> {
        self.units
            .checked_mul(self.rate)
            .ok_or_else(|| too_large("Lot cost basis"))
    }
}

/// Best available market price for an asset, already resolved by the caller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub ask: Decimal,
    #[serde(default)]
    pub bid: Option<Decimal>,
}

impl PriceQuote {
    pub fn from_ask(ask: Decimal) -> Self {
        PriceQuote { ask, bid: None }
    }
}

/// One mutation the ledger applied to a LotSet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum LotAction {
    /// A new lot was stored.
    Created { lot: Lot },
    /// A lot was partially consumed; `lot` carries the new units.
    #[serde(rename_all = "camelCase")]
    Updated { lot: Lot, previous_units: Decimal },
    /// A lot was fully consumed; `lot` is the lot as it was before removal.
    Deleted { lot: Lot },
}

impl LotAction {
    pub fn lot(&self) -> &Lot {
        match self {
            LotAction::Created { lot } | LotAction::Updated { lot, .. } | LotAction::Deleted { lot } => {
                lot
            }
        }
    }

    /// Units taken out of the lot by this action (zero for creations).
    pub fn units_consumed(&self) -> Decimal {
        match self {
            LotAction::Created { .. } => Decimal::ZERO,
            LotAction::Updated {
                lot,
                previous_units,
            } => *previous_units - lot.units,
            LotAction::Deleted { lot } => lot.units,
        }
    }
}

/// Actions taken by a removal, in the order they were applied.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemovalResult {
    pub actions: Vec<LotAction>,
}

impl RemovalResult {
    pub fn units_removed(&self) -> Result<Decimal> {
        units_consumed_by(&self.actions)
    }

    /// Acquisition cost of the consumed units, used for realized-gain reporting.
    pub fn cost_basis_removed(&self) -> Result<Decimal> {
        cost_consumed_by(&self.actions)
    }
}

/// Outcome of reconciling one asset against its observed balance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetReconciliation {
    pub asset_type: String,
    pub tracked_before: Decimal,
    pub observed: Decimal,
    /// Empty when the balances already agreed.
    pub actions: Vec<LotAction>,
    /// LotSet after reconciliation.
    pub lots: Vec<Lot>,
}

impl AssetReconciliation {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Outcome of reconciling several assets one at a time.
///
/// When `failure` is set, `outcomes` holds the assets that were committed
/// before the failing one; later assets were not touched.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<AssetReconciliation>,
    pub failure: Option<Error>,
}

impl ReconcileReport {
    pub fn into_result(self) -> Result<Vec<AssetReconciliation>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.outcomes),
        }
    }
}

pub(crate) fn too_large(what: &str) -> Error {
    Error::InvalidQuantity(format!("{} is too large to represent", what))
}

fn checked_sum<I>(values: I, what: &str) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value).ok_or_else(|| too_large(what))
    })
}

/// Total units across a LotSet.
pub fn total_units(lots: &[Lot]) -> Result<Decimal> {
    checked_sum(lots.iter().map(|lot| lot.units), "Total units")
}

/// Total acquisition cost of a LotSet.
pub fn total_cost(lots: &[Lot]) -> Result<Decimal> {
    let costs = lots.iter().map(Lot::cost_basis).collect::<Result<Vec<_>>>()?;
    checked_sum(costs, "Total cost")
}

/// Units taken out of lots by `actions`.
pub fn units_consumed_by(actions: &[LotAction]) -> Result<Decimal> {
    checked_sum(actions.iter().map(LotAction::units_consumed), "Units removed")
}

/// Acquisition cost of the units taken out of lots by `actions`.
pub fn cost_consumed_by(actions: &[LotAction]) -> Result<Decimal> {
    let costs = actions
        .iter()
        .map(|action| {
            action
                .units_consumed()
                .checked_mul(action.lot().rate)
                .ok_or_else(|| too_large("Cost basis"))
        })
        .collect::<Result<Vec<_>>>()?;
    checked_sum(costs, "Cost basis")
}
