//! SQLite storage implementation for lots.

mod model;
mod repository;

pub(crate) use model::{parse_decimal, parse_timestamp};
pub use model::LotDB;
pub use repository::LotRepository;
