use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::websocket::handler;
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/trades/:symbol", get(trades_handler))
        .route("/orderbook/:symbol", get(orderbook_handler))
        .route("/bbo/:symbol", get(bbo_handler))
}

async fn trades_handler(
    ws: WebSocketUpgrade,
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handler::serve_trades(socket, state, symbol))
}

async fn orderbook_handler(
    ws: WebSocketUpgrade,
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handler::serve_orderbook(socket, state, symbol))
}

async fn bbo_handler(
    ws: WebSocketUpgrade,
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handler::serve_bbo(socket, state, symbol))
}
