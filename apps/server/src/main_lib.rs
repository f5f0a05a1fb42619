use std::sync::Arc;

use crate::config::Config;
use lotbook_core::{
    history::HistoryRepositoryTrait,
    lots::{LedgerConfig, LotLedger, LotLedgerTrait, LotRepositoryTrait},
    trades::{TradeService, TradeServiceTrait},
};
use lotbook_storage_sqlite::{db, history::HistoryRepository, lots::LotRepository};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub trade_service: Arc<dyn TradeServiceTrait>,
    pub db_path: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("LB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone());

    let lot_repository: Arc<dyn LotRepositoryTrait> =
        Arc::new(LotRepository::new(pool.clone(), writer.clone()));
    let history_repository: Arc<dyn HistoryRepositoryTrait> =
        Arc::new(HistoryRepository::new(pool.clone(), writer.clone()));

    let ledger: Arc<dyn LotLedgerTrait> = Arc::new(LotLedger::with_config(
        lot_repository,
        LedgerConfig {
            reconcile_epsilon: config.reconcile_epsilon,
        },
    ));
    tracing::info!(
        "Reconciliation tolerance: {}",
        config.reconcile_epsilon.normalize()
    );

    let trade_service: Arc<dyn TradeServiceTrait> =
        Arc::new(TradeService::new(ledger, history_repository));

    Ok(Arc::new(AppState {
        trade_service,
        db_path,
    }))
}
