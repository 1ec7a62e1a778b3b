//! Matching Engine Types
//!
//! Shared types and DTOs for the matching engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Serialize a UTC timestamp as ISO-8601 with a trailing `Z`.
pub mod datetime_as_iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

// ============================================================================
// Price Key
// ============================================================================

/// Ordered map key for a price level.
///
/// Wraps a normalized `Decimal` so that `51000`, `51000.0` and `51000.00`
/// address the same level while comparison stays mathematically exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey(Decimal);

impl PriceKey {
    pub fn new(price: Decimal) -> Self {
        PriceKey(price.normalize())
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Order Enums
// ============================================================================

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Whether a resting level at `book_price` is acceptable to an
    /// aggressor on this side constrained by `limit`.
    pub fn accepts(&self, book_price: Decimal, limit: Decimal) -> bool {
        match self {
            Side::Buy => book_price <= limit,
            Side::Sell => book_price >= limit,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    /// Immediate or Cancel
    Ioc,
    /// Fill or Kill
    Fok,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
            OrderType::Ioc => write!(f, "ioc"),
            OrderType::Fok => write!(f, "fok"),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Constructed but not yet processed
    Pending,
    /// Resting in the orderbook, no fills yet
    Open,
    /// Some quantity filled, residual live
    PartiallyFilled,
    /// Completely filled
    Filled,
    /// Cancelled by the owner or by time-in-force rules
    Cancelled,
    /// Rejected before matching
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::PartiallyFilled => write!(f, "partially_filled"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Rejected => write!(f, "rejected"),
        }
    }
}

// ============================================================================
// Trade
// ============================================================================

/// A single execution between a resting maker and an incoming taker.
///
/// Immutable once created; the price is always the maker's resting price.
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub maker_order_id: Uuid,
    pub taker_order_id: Uuid,
    pub aggressor_side: Side,
    #[serde(with = "datetime_as_iso8601")]
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    pub fn new(
        symbol: &str,
        price: Decimal,
        quantity: Decimal,
        maker_order_id: Uuid,
        taker_order_id: Uuid,
        aggressor_side: Side,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            price,
            quantity,
            maker_order_id,
            taker_order_id,
            aggressor_side,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Snapshot Views
// ============================================================================

/// Aggregated depth-of-book view, bids high→low and asks low→high.
///
/// Rows are `[price, quantity]` pairs in canonical decimal string form;
/// empty levels are never reported.
#[derive(Debug, Clone, Serialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    #[serde(with = "datetime_as_iso8601")]
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

/// One side of the top of book.
#[derive(Debug, Clone, Serialize)]
pub struct BboQuote {
    pub price: String,
    pub qty: String,
}

/// Best bid and offer; a side is `null` when its book is empty.
#[derive(Debug, Clone, Serialize)]
pub struct BboSnapshot {
    pub symbol: String,
    #[serde(with = "datetime_as_iso8601")]
    pub timestamp: DateTime<Utc>,
    pub bid: Option<BboQuote>,
    pub ask: Option<BboQuote>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Matching engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    #[error("price must be positive for {0} orders")]
    InvalidPrice(OrderType),

    #[error("order {0} is already resting in the book")]
    DuplicateOrder(Uuid),

    #[error("fill of {fill} exceeds remaining {remaining} on order {order_id}")]
    Overfill {
        order_id: Uuid,
        fill: Decimal,
        remaining: Decimal,
    },

    #[error("order {0} was not submitted in the pending state")]
    NotPending(Uuid),
}
