//! Lot ledger service: per-key serialized add, removal and reconciliation.

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::consumption::{apply_actions, plan_removal};
use super::lots_model::{
    too_large, total_cost, total_units, AssetReconciliation, BaseKey, Lot, LotAction, LotKey,
    PriceQuote, ReconcileReport, RemovalResult,
};
use super::lots_traits::{LotLedgerTrait, LotRepositoryTrait};
use crate::constants::QUANTITY_THRESHOLD;
use crate::errors::{Error, Result, ValidationError};

/// Tunables for the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Differences between observed and tracked balances smaller than this
    /// are ignored by reconciliation.
    pub reconcile_epsilon: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            reconcile_epsilon: Decimal::from_str(QUANTITY_THRESHOLD)
                .unwrap_or_else(|_| Decimal::new(1, 8)),
        }
    }
}

/// Lot ledger: add, lowest-rate-first removal and reconciliation.
///
/// Every read-sort-mutate-write cycle runs under a per-key async lock, so
/// concurrent calls on the same key never observe a stale LotSet.
pub struct LotLedger {
    repository: Arc<dyn LotRepositoryTrait>,
    config: LedgerConfig,
    key_locks: DashMap<LotKey, Arc<Mutex<()>>>,
}

impl LotLedger {
    pub fn new(repository: Arc<dyn LotRepositoryTrait>) -> Self {
        Self::with_config(repository, LedgerConfig::default())
    }

    pub fn with_config(repository: Arc<dyn LotRepositoryTrait>, config: LedgerConfig) -> Self {
        LotLedger {
            repository,
            config,
            key_locks: DashMap::new(),
        }
    }

    fn key_lock(&self, key: &LotKey) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the lock entry for `key` once no other task holds or waits on it.
    ///
    /// Must be called after the guard is dropped, with the `Arc` returned by
    /// `key_lock`. The map and the caller account for two strong references.
    fn release_key_lock(&self, key: &LotKey, lock: Arc<Mutex<()>>) {
        self.key_locks
            .remove_if(key, |_, held| Arc::strong_count(held) == 2);
        drop(lock);
    }

    #[cfg(test)]
    pub(crate) fn key_lock_count(&self) -> usize {
        self.key_locks.len()
    }

    /// Checks that a lot of `units` at `rate` can join `existing`.
    ///
    /// Besides the domain rules, the lot's cost and the set's totals must stay
    /// representable so every later sum over the set succeeds.
    fn check_new_lot(key: &LotKey, existing: &[Lot], units: Decimal, rate: Decimal) -> Result<()> {
        if units <= Decimal::ZERO {
            return Err(Error::InvalidQuantity(format!(
                "Units must be positive, got {} for {}",
                units, key
            )));
        }
        if rate < Decimal::ZERO {
            return Err(Error::InvalidQuantity(format!(
                "Rate must not be negative, got {} for {}",
                rate, key
            )));
        }
        let cost = units
            .checked_mul(rate)
            .ok_or_else(|| too_large(&format!("Cost of {} @ {} for {}", units, rate, key)))?;
        total_units(existing)?
            .checked_add(units)
            .ok_or_else(|| too_large(&format!("Total units of {}", key)))?;
        total_cost(existing)?
            .checked_add(cost)
            .ok_or_else(|| too_large(&format!("Total cost of {}", key)))?;
        Ok(())
    }

    /// Caller must hold the key lock.
    async fn add_lot_locked(&self, key: &LotKey, units: Decimal, rate: Decimal) -> Result<Lot> {
        let existing = self.repository.load(key)?;
        if let Err(e) = Self::check_new_lot(key, &existing, units, rate) {
            warn!("Rejected add_lot for {}: {}", key, e);
            return Err(e);
        }

        let lot = Lot::new(key, units, rate);
        self.repository
            .apply(key, vec![LotAction::Created { lot: lot.clone() }])
            .await?;
        debug!("Added lot {} to {}: {} @ {}", lot.id, key, units, rate);
        Ok(lot)
    }

    /// Caller must hold the key lock. `lots` is the current LotSet for `key`.
    async fn remove_units_locked(
        &self,
        key: &LotKey,
        lots: &[Lot],
        units: Decimal,
    ) -> Result<RemovalResult> {
        let actions = match plan_removal(key, lots, units) {
            Ok(actions) => actions,
            Err(e) => {
                warn!("Rejected removal of {} from {}: {}", units, key, e);
                return Err(e);
            }
        };

        self.repository.apply(key, actions.clone()).await?;
        debug!(
            "Removed {} units from {} across {} lot(s)",
            units,
            key,
            actions.len()
        );
        Ok(RemovalResult { actions })
    }

    /// Differences at or below ε are treated as agreement; zero never acts.
    fn is_significant(&self, difference: Decimal) -> bool {
        difference.abs() > self.config.reconcile_epsilon
    }

    /// Validates every surplus asset before any of them is written.
    fn precheck_reconciliation(
        &self,
        base_key: &BaseKey,
        observed: &BTreeMap<&String, &Decimal>,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<()> {
        for (asset_type, balance) in observed {
            let key = base_key.for_asset(asset_type);
            let lots = self.repository.load(&key)?;
            let difference = **balance - total_units(&lots)?;
            if !self.is_significant(difference) || difference < Decimal::ZERO {
                continue;
            }
            let quote = prices.get(*asset_type).ok_or_else(|| {
                Error::Validation(ValidationError::MissingPrice(key.asset_type.clone()))
            })?;
            Self::check_new_lot(&key, &lots, difference, quote.ask)?;
        }
        Ok(())
    }

    /// Reconciles a single asset. Caller must hold the key lock.
    async fn reconcile_asset_locked(
        &self,
        key: &LotKey,
        observed: Decimal,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<AssetReconciliation> {
        let mut lots = self.repository.load(key)?;
        let tracked = total_units(&lots)?;
        let difference = observed - tracked;
        let mut actions = Vec::new();

        if !self.is_significant(difference) {
            debug!(
                "{} already in line with observed balance {} (tracked {})",
                key, observed, tracked
            );
        } else if difference > Decimal::ZERO {
            let quote = prices.get(&key.asset_type).ok_or_else(|| {
                Error::Validation(ValidationError::MissingPrice(key.asset_type.clone()))
            })?;
            info!(
                "Observed {} for {} exceeds tracked {}; adding {} @ ask {}",
                observed, key, tracked, difference, quote.ask
            );
            let lot = self.add_lot_locked(key, difference, quote.ask).await?;
            lots.push(lot.clone());
            actions.push(LotAction::Created { lot });
        } else {
            let shortfall = tracked - observed;
            info!(
                "Observed {} for {} is below tracked {}; removing {}",
                observed, key, tracked, shortfall
            );
            let result = self.remove_units_locked(key, &lots, shortfall).await?;
            apply_actions(&mut lots, &result.actions);
            actions = result.actions;
        }

        Ok(AssetReconciliation {
            asset_type: key.asset_type.clone(),
            tracked_before: tracked,
            observed,
            actions,
            lots,
        })
    }
}

#[async_trait]
impl LotLedgerTrait for LotLedger {
    async fn add_lot(&self, key: &LotKey, units: Decimal, rate: Decimal) -> Result<Lot> {
        let lock = self.key_lock(key);
        let guard = lock.lock().await;
        let result = self.add_lot_locked(key, units, rate).await;
        drop(guard);
        self.release_key_lock(key, lock);
        result
    }

    async fn remove_units(&self, key: &LotKey, units: Decimal) -> Result<RemovalResult> {
        let lock = self.key_lock(key);
        let guard = lock.lock().await;
        let result = match self.repository.load(key) {
            Ok(lots) => self.remove_units_locked(key, &lots, units).await,
            Err(e) => Err(e),
        };
        drop(guard);
        self.release_key_lock(key, lock);
        result
    }

    async fn reconcile_to_balances(
        &self,
        base_key: &BaseKey,
        observed: &HashMap<String, Decimal>,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<BTreeMap<String, Vec<Lot>>> {
        let outcomes = self
            .reconcile_assets(base_key, observed, prices)
            .await?
            .into_result()?;
        Ok(outcomes
            .into_iter()
            .map(|outcome| (outcome.asset_type, outcome.lots))
            .collect())
    }

    async fn reconcile_assets(
        &self,
        base_key: &BaseKey,
        observed: &HashMap<String, Decimal>,
        prices: &HashMap<String, PriceQuote>,
    ) -> Result<ReconcileReport> {
        if let Some((asset_type, balance)) = observed
            .iter()
            .find(|(_, balance)| **balance < Decimal::ZERO)
        {
            return Err(Error::InvalidQuantity(format!(
                "Observed balance for {} must not be negative, got {}",
                asset_type, balance
            )));
        }

        // Assets map to disjoint keys; walk them in a fixed order so logs and
        // partial failures are reproducible.
        let ordered: BTreeMap<&String, &Decimal> = observed.iter().collect();
        self.precheck_reconciliation(base_key, &ordered, prices)?;

        let mut report = ReconcileReport::default();
        for (asset_type, balance) in ordered {
            let key = base_key.for_asset(asset_type);
            let lock = self.key_lock(&key);
            let guard = lock.lock().await;
            let outcome = self.reconcile_asset_locked(&key, *balance, prices).await;
            drop(guard);
            self.release_key_lock(&key, lock);

            match outcome {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(
                        "Reconciliation stopped at {} after {} committed asset(s): {}",
                        key,
                        report.outcomes.len(),
                        e
                    );
                    report.failure = Some(e);
                    break;
                }
            }
        }

        Ok(report)
    }

    fn load_lots(&self, key: &LotKey) -> Result<Vec<Lot>> {
        self.repository.load(key)
    }

    fn list_lots(&self, account_id: &str, market: &str) -> Result<Vec<Lot>> {
        self.repository.list_for_account(account_id, market)
    }
}
