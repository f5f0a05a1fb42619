//! Lot repository and ledger traits.
//!
//! These traits define the contract for lot operations without any
//! database-specific types, allowing for different storage implementations.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::lots_model::{
    BaseKey, Lot, LotAction, LotKey, PriceQuote, ReconcileReport, RemovalResult,
};
use crate::errors::Result;

/// Trait defining the contract for Lot persistence.
#[async_trait]
pub trait LotRepositoryTrait: Send + Sync {
    /// Loads every lot stored for `key`, in the order they were stored.
    fn load(&self, key: &LotKey) -> Result<Vec<Lot>>;

    /// Loads every lot an account holds on a market, across bases and assets.
    fn list_for_account(&self, account_id: &str, market: &str) -> Result<Vec<Lot>>;

    /// Applies create/update/delete actions for `key` atomically.
    ///
    /// Either every action is persisted or none is.
    async fn apply(&self, key: &LotKey, actions: Vec<LotAction>) -> Result<()>;
}

/// Trait defining the contract for the lot ledger.
#[async_trait]
pub trait LotLedgerTrait: Send + Sync {
    /// Stores a new lot of `units` acquired at `rate`.
    async fn add_lot(&self, key: &LotKey, units: Decimal, rate: Decimal) -> Result<Lot>;

    /// Disposes of `units`, cheapest lots first.
    async fn remove_units(&self, key: &LotKey, units: Decimal) -> Result<RemovalResult>;

    /// Aligns tracked lots under `base_key` with balances observed on the market.
    ///
    /// Only assets present in `observed` are touched. Returns the resulting
    /// LotSet of each of them.
    async fn reconcile_to_balances(
        &self,
        base_key: &BaseKey,
        observed: &HashMap<String, Decimal>,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<BTreeMap<String, Vec<Lot>>>;

    /// Same as `reconcile_to_balances`, reporting the actions taken per asset
    /// in the order the assets were processed.
    ///
    /// Input errors (negative balances, missing or unusable prices) are
    /// returned as `Err` before anything is written. A failure while applying
    /// an asset is carried in the report next to the assets already committed.
    async fn reconcile_assets(
        &self,
        base_key: &BaseKey,
        observed: &HashMap<String, Decimal>,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<ReconcileReport>;

    /// Current LotSet for `key`.
    fn load_lots(&self, key: &LotKey) -> Result<Vec<Lot>>;

    /// Every lot an account holds on a market.
    fn list_lots(&self, account_id: &str, market: &str) -> Result<Vec<Lot>>;
}
