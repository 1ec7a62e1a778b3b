//! Market Data API Handlers
//!
//! Read-only views over the engine: depth snapshot, BBO, recent trades.
//! Referencing an unknown symbol lazily creates its (empty) book.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::{BboSnapshot, DepthSnapshot, Trade};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

/// Depth snapshot
/// GET /api/orderbook/:symbol?depth=N
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Json<DepthSnapshot> {
    let mut snapshot = state.engine.depth(&symbol);
    let depth = query.depth.unwrap_or(state.config.depth_limit);
    snapshot.bids.truncate(depth);
    snapshot.asks.truncate(depth);
    Json(snapshot)
}

/// Best bid and offer
/// GET /api/bbo/:symbol
pub async fn get_bbo(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Json<BboSnapshot> {
    Json(state.engine.bbo(&symbol))
}

#[derive(Debug, Deserialize, Default)]
pub struct TradesQuery {
    pub limit: Option<usize>,
}

impl TradesQuery {
    pub fn get_limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 100)
    }
}

#[derive(Debug, Serialize)]
pub struct TradesResponse {
    pub symbol: String,
    pub trades: Vec<Trade>,
}

/// Recent trades, newest first
/// GET /api/trades/:symbol?limit=N
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<TradesQuery>,
) -> Json<TradesResponse> {
    let trades = state.engine.recent_trades(&symbol, query.get_limit());
    Json(TradesResponse { symbol, trades })
}
