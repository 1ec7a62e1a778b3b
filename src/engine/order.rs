//! Order lifecycle
//!
//! An order is constructed in the pending state, validated up front, and
//! mutated only through `fill` and `cancel` afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::types::{EngineError, OrderStatus, OrderType, Side};

#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: Uuid,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Original quantity, immutable after construction.
    pub quantity: Decimal,
    /// Limit price; `None` only for market orders.
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
}

impl Order {
    /// Create a validated order with a fresh server-assigned id.
    ///
    /// Fails when the quantity is not positive, or when a non-market order
    /// is missing a positive price.
    pub fn new(
        symbol: &str,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
        client_order_id: Option<String>,
    ) -> Result<Self, EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(quantity));
        }
        if order_type != OrderType::Market && !price.is_some_and(|p| p > Decimal::ZERO) {
            return Err(EngineError::InvalidPrice(order_type));
        }

        let now = Utc::now();
        Ok(Self {
            order_id: Uuid::new_v4(),
            client_order_id,
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity,
            price,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: quantity,
        })
    }

    /// Record a fill of `quantity` at `price`.
    ///
    /// The quantity must be positive and at most the remaining quantity.
    /// The price argument is accepted for symmetry with trade emission but
    /// the order keeps no cumulative price state.
    pub fn fill(&mut self, quantity: Decimal, _price: Decimal) -> Result<(), EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity(quantity));
        }
        if quantity > self.remaining_quantity {
            return Err(EngineError::Overfill {
                order_id: self.order_id,
                fill: quantity,
                remaining: self.remaining_quantity,
            });
        }

        self.filled_quantity += quantity;
        self.remaining_quantity -= quantity;
        self.updated_at = Utc::now();
        self.status = if self.remaining_quantity.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        Ok(())
    }

    /// Cancel the order unless it already reached a terminal state.
    ///
    /// Returns whether a state change happened.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = Utc::now();
        true
    }
}
