//! WebSocket Feed Handlers
//!
//! Three public feeds per symbol: trades, depth snapshots, and BBO.
//! Each connection subscribes to one symbol via the path; `*` subscribes
//! to every symbol. Events arrive from the engine's fan-out channels;
//! slow consumers are lag-dropped by the broadcast layer rather than
//! backpressuring the engine.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::engine::{BboSnapshot, DepthSnapshot, Trade};
use crate::metrics;
use crate::AppState;

/// An event that can be pushed on a per-symbol feed.
pub trait FeedEvent: Clone + Serialize {
    fn symbol(&self) -> &str;
}

impl FeedEvent for Trade {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl FeedEvent for DepthSnapshot {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl FeedEvent for BboSnapshot {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// Whether a subscription covers a symbol; `*` matches all.
fn symbol_matches(subscription: &str, symbol: &str) -> bool {
    subscription == "*" || subscription == symbol
}

/// Trade feed: every execution on the subscribed symbol, in emission
/// order.
pub async fn serve_trades(socket: WebSocket, state: Arc<AppState>, symbol: String) {
    let rx = state.trade_tx.subscribe();
    run_feed("trades", socket, symbol, rx, None).await;
}

/// Depth feed: snapshot on connect, refreshed snapshot after each trade.
pub async fn serve_orderbook(socket: WebSocket, state: Arc<AppState>, symbol: String) {
    let rx = state.depth_tx.subscribe();
    let initial = if symbol == "*" {
        None
    } else {
        serde_json::to_string(&state.engine.depth(&symbol)).ok()
    };
    run_feed("orderbook", socket, symbol, rx, initial).await;
}

/// BBO feed: top of book on connect, refreshed after each trade.
pub async fn serve_bbo(socket: WebSocket, state: Arc<AppState>, symbol: String) {
    let rx = state.bbo_tx.subscribe();
    let initial = if symbol == "*" {
        None
    } else {
        serde_json::to_string(&state.engine.bbo(&symbol)).ok()
    };
    run_feed("bbo", socket, symbol, rx, initial).await;
}

async fn run_feed<T: FeedEvent>(
    feed: &'static str,
    socket: WebSocket,
    subscription: String,
    mut rx: broadcast::Receiver<T>,
    initial: Option<String>,
) {
    metrics::adjust_ws_connections(feed, 1);
    debug!(feed, symbol = %subscription, "websocket subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    if let Some(initial) = initial {
        if sender.send(Message::Text(initial)).await.is_err() {
            metrics::adjust_ws_connections(feed, -1);
            return;
        }
        metrics::record_ws_message_sent(feed);
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if !symbol_matches(&subscription, event.symbol()) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                            metrics::record_ws_message_sent(feed);
                        }
                        Err(e) => error!(feed, "failed to encode event: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(feed, lagged = n, "websocket subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Clients only keep the connection alive; inbound payloads are
            // ignored.
            message = receiver.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    metrics::adjust_ws_connections(feed, -1);
    debug!(feed, symbol = %subscription, "websocket subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_matches() {
        assert!(symbol_matches("BTC-USDT", "BTC-USDT"));
        assert!(symbol_matches("*", "BTC-USDT"));
        assert!(symbol_matches("*", "ETH-USDT"));
        assert!(!symbol_matches("BTC-USDT", "ETH-USDT"));
    }
}
