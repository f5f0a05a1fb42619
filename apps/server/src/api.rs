use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use lotbook_core::{
    history::{HistoryEntry, HistoryFilter},
    lots::Lot,
    trades::{HoldingsByBase, SaleResult, SyncRequest, TradeRequest},
};

pub async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if std::path::Path::new(&state.db_path).exists() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "database missing")
    }
}

fn require_symbol(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_trade(request: &TradeRequest) -> ApiResult<()> {
    require_symbol("base", &request.base)?;
    require_symbol("assetType", &request.asset_type)
}

async fn search_assets(
    Path((account_id, market)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<HoldingsByBase>> {
    let holdings = state.trade_service.search_assets(&account_id, &market)?;
    Ok(Json(holdings))
}

async fn buy_asset(
    Path((account_id, market)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<TradeRequest>,
) -> ApiResult<(StatusCode, Json<Lot>)> {
    check_trade(&request)?;
    let lot = state
        .trade_service
        .buy(&account_id, &market, request)
        .await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn sell_asset(
    Path((account_id, market)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<TradeRequest>,
) -> ApiResult<Json<SaleResult>> {
    check_trade(&request)?;
    let sale = state
        .trade_service
        .sell(&account_id, &market, request)
        .await?;
    Ok(Json(sale))
}

async fn sync_assets(
    Path((account_id, market)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<BTreeMap<String, Vec<Lot>>>> {
    require_symbol("base", &request.base)?;
    let lots = state
        .trade_service
        .sync_balances(&account_id, &market, request)
        .await?;
    Ok(Json(lots))
}

async fn get_history(
    Path((account_id, market)): Path<(String, String)>,
    Query(filter): Query<HistoryFilter>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let entries = state
        .trade_service
        .get_history(&account_id, &market, &filter)?;
    Ok(Json(entries))
}

fn market_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assets", get(search_assets))
        .route("/assets/buy", post(buy_asset))
        .route("/assets/sell", post(sell_asset))
        .route("/assets/sync", post(sync_assets))
        .route("/history", get(get_history))
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/accounts/{account_id}/markets/{market}", market_router());

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
}
