//! Database models for lots.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::StorageError;
use lotbook_core::lots::{Lot, LotKey};

/// Database model for lots. Decimals are stored as TEXT to keep full precision.
#[derive(Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::lots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LotDB {
    pub id: String,
    pub account_id: String,
    pub market: String,
    pub base: String,
    pub asset_type: String,
    pub units: String,
    pub rate: String,
    /// Insertion position within the key; ties in consumption order fall back to it.
    pub seq: i64,
    pub created_at: String,
}

impl LotDB {
    pub fn from_domain(key: &LotKey, lot: &Lot, seq: i64) -> Self {
        LotDB {
            id: lot.id.clone(),
            account_id: key.account_id.clone(),
            market: key.market.clone(),
            base: key.base.clone(),
            asset_type: key.asset_type.clone(),
            units: lot.units.to_string(),
            rate: lot.rate.to_string(),
            seq,
            created_at: lot.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(value)
        .map_err(|e| StorageError::Decode(format!("{} '{}': {}", column, value, e)))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Decode(format!("{} '{}': {}", column, value, e)))
}

impl TryFrom<LotDB> for Lot {
    type Error = StorageError;

    fn try_from(db: LotDB) -> Result<Self, Self::Error> {
        Ok(Lot {
            units: parse_decimal("units", &db.units)?,
            rate: parse_decimal("rate", &db.rate)?,
            created_at: parse_timestamp("created_at", &db.created_at)?,
            id: db.id,
            base: db.base,
            asset_type: db.asset_type,
        })
    }
}
