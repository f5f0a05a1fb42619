//! In-memory LotRepository used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{Lot, LotAction, LotKey, LotRepositoryTrait};
use crate::errors::{DatabaseError, Error, Result};

#[derive(Default)]
pub struct MockLotRepository {
    lots: RwLock<HashMap<LotKey, Vec<Lot>>>,
    fail_writes: AtomicBool,
    failing_asset: RwLock<Option<String>>,
    apply_calls: AtomicUsize,
}

impl MockLotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a LotSet directly, bypassing the ledger.
    pub fn seed(&self, key: &LotKey, lots: Vec<Lot>) {
        self.lots.write().unwrap().insert(key.clone(), lots);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails writes only for keys holding `asset_type`.
    pub fn fail_writes_for_asset(&self, asset_type: &str) {
        *self.failing_asset.write().unwrap() = Some(asset_type.to_string());
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn all_lots(&self) -> Vec<Lot> {
        self.lots
            .read()
            .unwrap()
            .values()
            .flat_map(|lots| lots.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl LotRepositoryTrait for MockLotRepository {
    fn load(&self, key: &LotKey) -> Result<Vec<Lot>> {
        Ok(self
            .lots
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn list_for_account(&self, account_id: &str, market: &str) -> Result<Vec<Lot>> {
        let lots = self.lots.read().unwrap();
        let mut keys: Vec<&LotKey> = lots
            .keys()
            .filter(|k| k.account_id == account_id && k.market == market)
            .collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .flat_map(|k| lots[k].iter().cloned())
            .collect())
    }

    async fn apply(&self, key: &LotKey, actions: Vec<LotAction>) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let asset_fails =
            self.failing_asset.read().unwrap().as_deref() == Some(key.asset_type.as_str());
        if asset_fails || self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::ConnectionFailed(
                "mock storage offline".to_string(),
            )));
        }

        // Work on a copy so a bad action leaves the stored set untouched.
        let mut store = self.lots.write().unwrap();
        let mut working = store.get(key).cloned().unwrap_or_default();
        for action in &actions {
            match action {
                LotAction::Created { lot } => working.push(lot.clone()),
                LotAction::Updated { lot, .. } => {
                    let existing = working
                        .iter_mut()
                        .find(|l| l.id == lot.id)
                        .ok_or_else(|| Error::Database(DatabaseError::NotFound(lot.id.clone())))?;
                    existing.units = lot.units;
                }
                LotAction::Deleted { lot } => {
                    let before = working.len();
                    working.retain(|l| l.id != lot.id);
                    if working.len() == before {
                        return Err(Error::Database(DatabaseError::NotFound(lot.id.clone())));
                    }
                }
            }
        }
        store.insert(key.clone(), working);
        Ok(())
    }
}
