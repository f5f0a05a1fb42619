use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::sync::Arc;

use lotbook_core::errors::Error;
use lotbook_core::history::{HistoryEntry, HistoryFilter, HistoryRepositoryTrait};
use lotbook_core::Result;

use super::model::HistoryEntryDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::trade_history;

pub struct HistoryRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl HistoryRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        HistoryRepository { pool, writer }
    }
}

#[async_trait]
impl HistoryRepositoryTrait for HistoryRepository {
    async fn append(&self, entries: Vec<HistoryEntry>) -> Result<usize> {
        let rows: Vec<HistoryEntryDB> = entries.into_iter().map(HistoryEntryDB::from).collect();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                diesel::insert_into(trade_history::table)
                    .values(&rows)
                    .execute(conn)
                    .into_core()
            })
            .await
    }

    fn list(
        &self,
        account_id: &str,
        market: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = trade_history::table
            .filter(trade_history::account_id.eq(account_id.to_string()))
            .filter(trade_history::market.eq(market.to_string()))
            .into_boxed();

        if let Some(base) = &filter.base {
            query = query.filter(trade_history::base.eq(base.clone()));
        }
        if let Some(asset_type) = &filter.asset_type {
            query = query.filter(trade_history::asset_type.eq(asset_type.clone()));
        }

        // ids are UUID v7, so they break timestamp ties in insertion order
        let rows = query
            .order((trade_history::timestamp.asc(), trade_history::id.asc()))
            .select(HistoryEntryDB::as_select())
            .load::<HistoryEntryDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| HistoryEntry::try_from(row).map_err(Error::from))
            .collect()
    }
}
