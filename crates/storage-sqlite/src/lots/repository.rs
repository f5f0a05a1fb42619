use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;

use lotbook_core::errors::{DatabaseError, Error};
use lotbook_core::lots::{Lot, LotAction, LotKey, LotRepositoryTrait};
use lotbook_core::Result;

use super::model::LotDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::lots;

pub struct LotRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LotRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        LotRepository { pool, writer }
    }

    fn to_domain(rows: Vec<LotDB>) -> Result<Vec<Lot>> {
        rows.into_iter()
            .map(|row| Lot::try_from(row).map_err(Error::from))
            .collect()
    }
}

fn key_filter(key: &LotKey) -> lots::BoxedQuery<'static, diesel::sqlite::Sqlite> {
    lots::table
        .filter(lots::account_id.eq(key.account_id.clone()))
        .filter(lots::market.eq(key.market.clone()))
        .filter(lots::base.eq(key.base.clone()))
        .filter(lots::asset_type.eq(key.asset_type.clone()))
        .into_boxed()
}

/// Applies one batch of actions. Runs inside the writer's transaction.
fn apply_actions(conn: &mut SqliteConnection, key: &LotKey, actions: &[LotAction]) -> Result<()> {
    let mut next_seq: i64 = key_filter(key)
        .select(diesel::dsl::max(lots::seq))
        .first::<Option<i64>>(conn)
        .into_core()?
        .map_or(0, |seq| seq + 1);

    for action in actions {
        match action {
            LotAction::Created { lot } => {
                diesel::insert_into(lots::table)
                    .values(LotDB::from_domain(key, lot, next_seq))
                    .execute(conn)
                    .into_core()?;
                next_seq += 1;
            }
            LotAction::Updated { lot, .. } => {
                let updated = diesel::update(lots::table.find(&lot.id))
                    .set(lots::units.eq(lot.units.to_string()))
                    .execute(conn)
                    .into_core()?;
                if updated == 0 {
                    return Err(Error::Database(DatabaseError::NotFound(format!(
                        "Lot {} of {}",
                        lot.id, key
                    ))));
                }
            }
            LotAction::Deleted { lot } => {
                let deleted = diesel::delete(lots::table.find(&lot.id))
                    .execute(conn)
                    .into_core()?;
                if deleted == 0 {
                    return Err(Error::Database(DatabaseError::NotFound(format!(
                        "Lot {} of {}",
                        lot.id, key
                    ))));
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl LotRepositoryTrait for LotRepository {
    fn load(&self, key: &LotKey) -> Result<Vec<Lot>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = key_filter(key)
            .order(lots::seq.asc())
            .select(LotDB::as_select())
            .load::<LotDB>(&mut conn)
            .map_err(StorageError::from)?;
        Self::to_domain(rows)
    }

    fn list_for_account(&self, account_id: &str, market: &str) -> Result<Vec<Lot>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = lots::table
            .filter(lots::account_id.eq(account_id))
            .filter(lots::market.eq(market))
            .order((lots::base.asc(), lots::asset_type.asc(), lots::seq.asc()))
            .select(LotDB::as_select())
            .load::<LotDB>(&mut conn)
            .map_err(StorageError::from)?;
        Self::to_domain(rows)
    }

    async fn apply(&self, key: &LotKey, actions: Vec<LotAction>) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let key = key.clone();
        debug!("Persisting {} lot action(s) for {}", actions.len(), key);
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                apply_actions(conn, &key, &actions)
            })
            .await
    }
}
