//! Order Matching Engine Module
//!
//! Central-limit order book matching with price-time priority.
//!
//! # Architecture
//!
//! ```text
//! REST / WebSocket transport
//!   ↓
//! MatchingEngine (per-symbol dispatch, trade log, listener fan-out)
//!   └→ OrderBook (one per symbol, lock-serialized)
//!        └→ PriceLevel (FIFO queue per price)
//! ```
//!
//! # Guarantees
//!
//! - **Price-Time Priority**: best price first, oldest order first within
//!   a price level
//! - **Maker Pricing**: every trade executes at the resting order's price
//! - **Per-Book Serialization**: one lock per book; symbols match in
//!   parallel, snapshots never observe a half-applied match
//! - **Synchronous Fan-out**: trade listeners run in registration order
//!   before `process_order` returns

mod book;
mod level;
mod matcher;
mod order;
mod types;

pub use book::OrderBook;
pub use level::PriceLevel;
pub use matcher::{MatchingEngine, TradeListener};
pub use order::Order;
pub use types::*;
