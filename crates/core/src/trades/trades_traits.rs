//! Trade service trait.

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::trades_model::{HoldingsByBase, SaleResult, SyncRequest, TradeRequest};
use crate::errors::Result;
use crate::history::{HistoryEntry, HistoryFilter};
use crate::lots::Lot;

/// Account-level trade operations: ledger mutations followed by history.
#[async_trait]
pub trait TradeServiceTrait: Send + Sync {
    /// Records an acquisition as a new lot.
    async fn buy(&self, account_id: &str, market: &str, request: TradeRequest) -> Result<Lot>;

    /// Disposes of units lowest rate first and records the realized gain.
    async fn sell(
        &self,
        account_id: &str,
        market: &str,
        request: TradeRequest,
    ) -> Result<SaleResult>;

    /// Reconciles tracked lots with balances observed on the market.
    async fn sync_balances(
        &self,
        account_id: &str,
        market: &str,
        request: SyncRequest,
    ) -> Result<BTreeMap<String, Vec<Lot>>>;

    /// Every lot held on a market, grouped by base then asset.
    fn search_assets(&self, account_id: &str, market: &str) -> Result<HoldingsByBase>;

    fn get_history(
        &self,
        account_id: &str,
        market: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>>;
}
