//! Market pulse routes

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use pulse_core::MarketPulseResult;

use crate::{AppError, AppState};

pub fn pulse_routes() -> Router<AppState> {
    Router::new().route("/market-pulse/:ticker", get(get_market_pulse))
}

/// Composite sentiment snapshot for one ticker
async fn get_market_pulse(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<MarketPulseResult>, AppError> {
    let result = state.orchestrator.get_market_pulse(&ticker).await?;
    Ok(Json(result))
}
