//! Price level
//!
//! FIFO queue of resting orders at a single price, with a running
//! aggregate of their remaining quantity. Arrival order is preserved so
//! time priority inside a level is simply queue order.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use uuid::Uuid;

use super::order::Order;

#[derive(Debug)]
pub struct PriceLevel {
    price: Decimal,
    orders: VecDeque<Order>,
    total_quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Sum of `remaining_quantity` over all queued orders.
    pub fn total_quantity(&self) -> Decimal {
        self.total_quantity
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Append to the tail of the queue.
    pub fn add(&mut self, order: Order) {
        self.total_quantity += order.remaining_quantity;
        self.orders.push_back(order);
    }

    /// Head of the queue without removal.
    pub fn peek_oldest(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn peek_oldest_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Remove and return the head of the queue, releasing whatever
    /// quantity it still carried.
    pub fn pop_oldest(&mut self) -> Option<Order> {
        let order = self.orders.pop_front()?;
        self.total_quantity -= order.remaining_quantity;
        Some(order)
    }

    pub fn get(&self, order_id: Uuid) -> Option<&Order> {
        self.iter().find(|o| o.order_id == order_id)
    }

    /// Queued orders in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Remove a specific order, preserving the order of survivors.
    pub fn remove(&mut self, order_id: Uuid) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.order_id == order_id)?;
        let order = self.orders.remove(pos)?;
        self.total_quantity -= order.remaining_quantity;
        Some(order)
    }

    /// Account for a fill executed against an order in this level.
    ///
    /// Must be called on every fill, not only when the head is popped,
    /// so depth and BBO aggregates stay accurate mid-level.
    pub fn reduce_total(&mut self, quantity: Decimal) {
        self.total_quantity -= quantity;
    }
}
