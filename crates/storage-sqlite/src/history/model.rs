//! Database models for the trade history.

use chrono::SecondsFormat;
use diesel::prelude::*;
use std::str::FromStr;

use crate::errors::StorageError;
use crate::lots::{parse_decimal, parse_timestamp};
use lotbook_core::history::{HistoryEntry, TradeType};

#[derive(Queryable, Identifiable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::trade_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryEntryDB {
    pub id: String,
    pub account_id: String,
    pub market: String,
    pub base: String,
    pub asset_type: String,
    pub trade_type: String,
    pub units: String,
    pub rate: String,
    pub total: String,
    pub cost_basis: Option<String>,
    pub timestamp: String,
}

impl From<HistoryEntry> for HistoryEntryDB {
    fn from(domain: HistoryEntry) -> Self {
        Self {
            id: domain.id,
            account_id: domain.account_id,
            market: domain.market,
            base: domain.base,
            asset_type: domain.asset_type,
            trade_type: domain.trade_type.as_str().to_string(),
            units: domain.units.to_string(),
            rate: domain.rate.to_string(),
            total: domain.total.to_string(),
            cost_basis: domain.cost_basis.map(|c| c.to_string()),
            timestamp: domain.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

impl TryFrom<HistoryEntryDB> for HistoryEntry {
    type Error = StorageError;

    fn try_from(db: HistoryEntryDB) -> Result<Self, Self::Error> {
        let cost_basis = db
            .cost_basis
            .as_deref()
            .map(|c| parse_decimal("cost_basis", c))
            .transpose()?;
        Ok(HistoryEntry {
            trade_type: TradeType::from_str(&db.trade_type).map_err(StorageError::Decode)?,
            units: parse_decimal("units", &db.units)?,
            rate: parse_decimal("rate", &db.rate)?,
            total: parse_decimal("total", &db.total)?,
            cost_basis,
            timestamp: parse_timestamp("timestamp", &db.timestamp)?,
            id: db.id,
            account_id: db.account_id,
            market: db.market,
            base: db.base,
            asset_type: db.asset_type,
        })
    }
}
