//! Trade history repository trait.

use async_trait::async_trait;

use super::history_model::{HistoryEntry, HistoryFilter};
use crate::errors::Result;

/// Persistence contract for the trade history.
#[async_trait]
pub trait HistoryRepositoryTrait: Send + Sync {
    /// Appends entries in one batch.
    async fn append(&self, entries: Vec<HistoryEntry>) -> Result<usize>;

    /// Lists an account's entries on a market, oldest first.
    fn list(
        &self,
        account_id: &str,
        market: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>>;
}
