//! Trade service: buys, sells and balance syncs recorded in the trade history.

use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::trades_model::{group_by_base, HoldingsByBase, SaleResult, SyncRequest, TradeRequest};
use super::trades_traits::TradeServiceTrait;
use crate::constants::DECIMAL_PRECISION;
use crate::errors::{Error, Result};
use crate::history::{HistoryEntry, HistoryFilter, HistoryRepositoryTrait, TradeType};
use crate::lots::{
    cost_consumed_by, units_consumed_by, AssetReconciliation, BaseKey, Lot, LotAction, LotKey,
    LotLedgerTrait, PriceQuote,
};

/// Service tying ledger mutations to the trade history.
///
/// History is appended after the ledger mutation has committed. A failed
/// append is returned to the caller; the ledger change is kept.
pub struct TradeService {
    ledger: Arc<dyn LotLedgerTrait>,
    history_repository: Arc<dyn HistoryRepositoryTrait>,
}

impl TradeService {
    pub fn new(
        ledger: Arc<dyn LotLedgerTrait>,
        history_repository: Arc<dyn HistoryRepositoryTrait>,
    ) -> Self {
        Self {
            ledger,
            history_repository,
        }
    }

    fn total(units: Decimal, rate: Decimal) -> Result<Decimal> {
        units
            .checked_mul(rate)
            .map(|total| total.round_dp(DECIMAL_PRECISION))
            .ok_or_else(|| {
                Error::InvalidQuantity(format!(
                    "Total of {} @ {} is too large to represent",
                    units, rate
                ))
            })
    }

    /// Rate used to value units that left the account outside of a recorded sale.
    ///
    /// Prefers the bid, then the ask; without a usable quote the consumed
    /// lots' average rate is used so no gain is reported.
    fn disposal_rate(
        quote: Option<&PriceQuote>,
        units: Decimal,
        cost_basis: Decimal,
    ) -> Result<Decimal> {
        if let Some(rate) = quote.map(|q| q.bid.unwrap_or(q.ask)) {
            if units.checked_mul(rate).is_some() {
                return Ok(rate);
            }
            warn!("Quote {} cannot value {} units; using average cost", rate, units);
        }
        if units.is_zero() {
            return Ok(Decimal::ZERO);
        }
        cost_basis.checked_div(units).ok_or_else(|| {
            Error::InvalidQuantity(format!(
                "Average cost of {} over {} units is too large to represent",
                cost_basis, units
            ))
        })
    }

    fn reconciliation_entry(
        base_key: &BaseKey,
        outcome: &AssetReconciliation,
        quote: Option<&PriceQuote>,
    ) -> Result<Option<HistoryEntry>> {
        let key = base_key.for_asset(&outcome.asset_type);

        if let Some(LotAction::Created { lot }) = outcome.actions.first() {
            return Ok(Some(HistoryEntry::new(
                &key,
                TradeType::ReconcileIn,
                lot.units,
                lot.rate,
                Self::total(lot.units, lot.rate)?,
            )));
        }

        let units = units_consumed_by(&outcome.actions)?;
        if units.is_zero() {
            return Ok(None);
        }
        let cost_basis = cost_consumed_by(&outcome.actions)?;
        let rate = Self::disposal_rate(quote, units, cost_basis)?;

        Ok(Some(
            HistoryEntry::new(
                &key,
                TradeType::ReconcileOut,
                units,
                rate,
                Self::total(units, rate)?,
            )
            .with_cost_basis(cost_basis),
        ))
    }

    /// Appends history for the assets a sync actually changed.
    async fn record_reconciliations(
        &self,
        base_key: &BaseKey,
        outcomes: &[AssetReconciliation],
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<()> {
        let mut entries = Vec::new();
        for outcome in outcomes.iter().filter(|outcome| !outcome.is_noop()) {
            if let Some(entry) =
                Self::reconciliation_entry(base_key, outcome, prices.get(&outcome.asset_type))?
            {
                entries.push(entry);
            }
        }

        if !entries.is_empty() {
            debug!(
                "Recording {} reconciliation entries for {}/{}",
                entries.len(),
                base_key.account_id,
                base_key.market
            );
            self.history_repository.append(entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TradeServiceTrait for TradeService {
    async fn buy(&self, account_id: &str, market: &str, request: TradeRequest) -> Result<Lot> {
        let key = LotKey::new(account_id, market, request.base, request.asset_type);
        let lot = self.ledger.add_lot(&key, request.units, request.rate).await?;

        let entry = HistoryEntry::new(
            &key,
            TradeType::Buy,
            lot.units,
            lot.rate,
            Self::total(lot.units, lot.rate)?,
        );
        self.history_repository.append(vec![entry]).await?;
        Ok(lot)
    }

    async fn sell(
        &self,
        account_id: &str,
        market: &str,
        request: TradeRequest,
    ) -> Result<SaleResult> {
        if request.rate < Decimal::ZERO {
            warn!("Rejected sell with negative rate {}", request.rate);
            return Err(Error::InvalidQuantity(format!(
                "Rate must not be negative, got {}",
                request.rate
            )));
        }

        // Must succeed before any lot is removed.
        let proceeds = Self::total(request.units, request.rate)?;

        let key = LotKey::new(account_id, market, request.base, request.asset_type);
        let removal = self.ledger.remove_units(&key, request.units).await?;

        let cost_basis = removal.cost_basis_removed()?;
        let entry = HistoryEntry::new(&key, TradeType::Sell, request.units, request.rate, proceeds)
            .with_cost_basis(cost_basis);
        let realized_gain = proceeds - cost_basis;
        debug!(
            "Sold {} of {} for {} (cost basis {}, gain {})",
            request.units, key, proceeds, cost_basis, realized_gain
        );
        self.history_repository.append(vec![entry]).await?;

        Ok(SaleResult {
            removal,
            proceeds,
            cost_basis,
            realized_gain,
        })
    }

    async fn sync_balances(
        &self,
        account_id: &str,
        market: &str,
        request: SyncRequest,
    ) -> Result<BTreeMap<String, Vec<Lot>>> {
        let base_key = BaseKey::new(account_id, market, request.base);
        let report = self
            .ledger
            .reconcile_assets(&base_key, &request.balances, &request.prices)
            .await?;

        // Committed assets are recorded even when a later asset failed.
        let recorded = self
            .record_reconciliations(&base_key, &report.outcomes, &request.prices)
            .await;

        match (report.failure, recorded) {
            (Some(failure), Ok(())) => Err(failure),
            (Some(failure), Err(history_err)) => {
                warn!(
                    "History for committed reconciliations of {}/{} was not recorded: {}",
                    account_id, market, history_err
                );
                Err(failure)
            }
            (None, Err(history_err)) => Err(history_err),
            (None, Ok(())) => Ok(report
                .outcomes
                .into_iter()
                .map(|outcome| (outcome.asset_type, outcome.lots))
                .collect()),
        }
    }

    fn search_assets(&self, account_id: &str, market: &str) -> Result<HoldingsByBase> {
        let lots = self.ledger.list_lots(account_id, market)?;
        Ok(group_by_base(lots))
    }

    fn get_history(
        &self,
        account_id: &str,
        market: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>> {
        self.history_repository.list(account_id, market, filter)
    }
}
