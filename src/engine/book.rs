//! Orderbook Implementation
//!
//! One book per symbol: two price-ordered level maps, an order-id index
//! for cancel routing, and the price-time matching sweep shared by every
//! order type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::level::PriceLevel;
use super::order::Order;
use super::types::{
    BboQuote, BboSnapshot, DepthSnapshot, EngineError, OrderStatus, PriceKey, Side, Trade,
};

pub struct OrderBook {
    symbol: String,

    /// Bids keyed by price ascending; matching iterates in reverse so the
    /// highest bid is consumed first.
    bids: BTreeMap<PriceKey, PriceLevel>,

    /// Asks keyed by price ascending; the lowest ask is consumed first.
    asks: BTreeMap<PriceKey, PriceLevel>,

    /// Order ID to (side, price) mapping for direct cancellation
    orders: HashMap<Uuid, (Side, PriceKey)>,

    last_updated: DateTime<Utc>,
}

impl OrderBook {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Number of resting orders across both sides.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.orders.contains_key(&order_id)
    }

    /// Admit a residual order to its side of the book.
    ///
    /// The order must already be live (open or partially filled); an id
    /// collision with a resting order is an invariant breach reported as
    /// `DuplicateOrder`.
    pub fn add(&mut self, order: Order) -> Result<(), EngineError> {
        if self.orders.contains_key(&order.order_id) {
            return Err(EngineError::DuplicateOrder(order.order_id));
        }
        debug_assert!(matches!(
            order.status,
            OrderStatus::Open | OrderStatus::PartiallyFilled
        ));
        let price = match order.price {
            Some(p) => p,
            None => return Err(EngineError::InvalidPrice(order.order_type)),
        };

        let key = PriceKey::new(price);
        let side = order.side;
        let order_id = order.order_id;
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        book_side
            .entry(key)
            .or_insert_with(|| PriceLevel::new(key.as_decimal()))
            .add(order);

        self.orders.insert(order_id, (side, key));
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Remove a resting order, dropping its level if it empties out.
    pub fn remove(&mut self, order_id: Uuid) -> Option<Order> {
        let (side, key) = self.orders.remove(&order_id)?;
        let book_side = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = book_side.get_mut(&key)?;
        let order = level.remove(order_id);
        if level.is_empty() {
            book_side.remove(&key);
        }
        self.last_updated = Utc::now();
        order
    }

    /// Look up a resting order without mutation.
    pub fn get(&self, order_id: Uuid) -> Option<&Order> {
        let (side, key) = self.orders.get(&order_id)?;
        let book_side = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book_side.get(key)?.get(order_id)
    }

    /// Highest bid price with that level's aggregate quantity.
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids
            .iter()
            .next_back()
            .map(|(key, level)| (key.as_decimal(), level.total_quantity()))
    }

    /// Lowest ask price with that level's aggregate quantity.
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks
            .iter()
            .next()
            .map(|(key, level)| (key.as_decimal(), level.total_quantity()))
    }

    /// Match an incoming order against the opposite side of the book.
    ///
    /// `limit` bounds the acceptable level prices; `None` sweeps the whole
    /// side (market orders). Trades always execute at the resting level's
    /// price, best level first, oldest order first within a level. Fully
    /// filled makers are popped and de-indexed; emptied levels are
    /// dropped. The taker is never admitted here.
    pub(crate) fn match_incoming(
        &mut self,
        taker: &mut Order,
        limit: Option<Decimal>,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut trades = Vec::new();

        loop {
            if taker.remaining_quantity.is_zero() {
                break;
            }

            let book_side = match taker.side.opposite() {
                Side::Sell => &mut self.asks,
                Side::Buy => &mut self.bids,
            };
            let best = match taker.side {
                Side::Buy => book_side.keys().next().copied(),
                Side::Sell => book_side.keys().next_back().copied(),
            };
            let Some(best) = best else { break };
            if let Some(limit) = limit {
                if !taker.side.accepts(best.as_decimal(), limit) {
                    break;
                }
            }
            let Some(level) = book_side.get_mut(&best) else { break };
            let level_price = level.price();

            while !taker.remaining_quantity.is_zero() && !level.is_empty() {
                let Some(maker) = level.peek_oldest_mut() else { break };

                let fill = taker.remaining_quantity.min(maker.remaining_quantity);
                let maker_id = maker.order_id;
                maker.fill(fill, level_price)?;
                let maker_filled = maker.status == OrderStatus::Filled;
                level.reduce_total(fill);
                taker.fill(fill, level_price)?;

                trades.push(Trade::new(
                    &self.symbol,
                    level_price,
                    fill,
                    maker_id,
                    taker.order_id,
                    taker.side,
                ));
                tracing::debug!(
                    symbol = %self.symbol,
                    price = %level_price,
                    quantity = %fill,
                    maker = %maker_id,
                    taker = %taker.order_id,
                    "trade executed"
                );

                if maker_filled {
                    level.pop_oldest();
                    self.orders.remove(&maker_id);
                }
            }

            if level.is_empty() {
                book_side.remove(&best);
            }
        }

        if !trades.is_empty() {
            self.last_updated = Utc::now();
        }
        Ok(trades)
    }

    /// Non-destructive fill-or-kill feasibility scan.
    ///
    /// Walks the opposite side best-first under the same price acceptance
    /// predicate as `match_incoming`, accumulating level aggregates until
    /// the order's quantity is covered.
    pub(crate) fn can_fill(&self, taker: &Order, limit: Decimal) -> bool {
        let book_side = match taker.side.opposite() {
            Side::Sell => &self.asks,
            Side::Buy => &self.bids,
        };
        let levels: Box<dyn Iterator<Item = (&PriceKey, &PriceLevel)> + '_> = match taker.side {
            Side::Buy => Box::new(book_side.iter()),
            Side::Sell => Box::new(book_side.iter().rev()),
        };

        let mut needed = taker.remaining_quantity;
        for (key, level) in levels {
            if !taker.side.accepts(key.as_decimal(), limit) {
                break;
            }
            if level.total_quantity() >= needed {
                return true;
            }
            needed -= level.total_quantity();
        }
        false
    }

    /// Aggregated depth view, bids high→low and asks low→high.
    pub fn snapshot(&self) -> DepthSnapshot {
        let row = |key: &PriceKey, level: &PriceLevel| {
            [key.to_string(), level.total_quantity().to_string()]
        };
        DepthSnapshot {
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            bids: self.bids.iter().rev().map(|(k, l)| row(k, l)).collect(),
            asks: self.asks.iter().map(|(k, l)| row(k, l)).collect(),
        }
    }

    /// Best bid and offer view.
    pub fn bbo(&self) -> BboSnapshot {
        let quote = |top: Option<(Decimal, Decimal)>| {
            top.map(|(price, qty)| BboQuote {
                price: price.to_string(),
                qty: qty.to_string(),
            })
        };
        BboSnapshot {
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            bid: quote(self.best_bid()),
            ask: quote(self.best_ask()),
        }
    }
}
