//! Matching Engine
//!
//! Price-time priority matching across lazily created per-symbol books.
//! Each book is guarded by its own lock, so order flow on different
//! symbols proceeds in parallel while all operations on one book are
//! serialized.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::metrics;

use super::book::OrderBook;
use super::order::Order;
use super::types::{BboSnapshot, DepthSnapshot, EngineError, OrderStatus, OrderType, Trade};

/// Synchronous trade consumer.
///
/// Listeners run on the matching thread, under the emitting book's lock,
/// before `process_order` returns; they must not submit orders, take
/// snapshots, or otherwise reenter the engine. Anything slow or
/// reentrant belongs on another executor fed from a listener.
pub type TradeListener = Box<dyn Fn(&Trade) + Send + Sync>;

pub struct MatchingEngine {
    /// Symbol -> book, created on first reference.
    books: DashMap<String, Arc<Mutex<OrderBook>>>,

    /// Executed trades in global emission order.
    trade_log: Mutex<Vec<Trade>>,

    /// Trade consumers in registration order.
    listeners: RwLock<Vec<TradeListener>>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            trade_log: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a consumer invoked for every trade, in registration
    /// order, before the emitting `process_order` call returns.
    pub fn register_trade_listener(&self, listener: impl Fn(&Trade) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    fn book(&self, symbol: &str) -> Arc<Mutex<OrderBook>> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(symbol))))
            .clone()
    }

    /// Process an incoming order according to its type.
    ///
    /// Returns the order in its final state together with the trades it
    /// produced, already delivered to all registered listeners.
    pub fn process_order(&self, mut order: Order) -> Result<(Order, Vec<Trade>), EngineError> {
        if order.status != OrderStatus::Pending {
            return Err(EngineError::NotPending(order.order_id));
        }

        metrics::record_order_submitted(&order.side.to_string(), &order.order_type.to_string());
        let timer = metrics::Timer::new();

        let book = self.book(&order.symbol);
        let mut book = book.lock();
        let trades = match order.order_type {
            OrderType::Market => self.match_market(&mut order, &mut book)?,
            OrderType::Limit => self.match_limit(&mut order, &mut book)?,
            OrderType::Ioc => self.match_ioc(&mut order, &mut book)?,
            OrderType::Fok => self.match_fok(&mut order, &mut book)?,
        };

        // Publish while still holding the book lock: the log and the
        // listeners must observe trades in call-serialization order for
        // the symbol, not in whatever order the threads resume.
        if !trades.is_empty() {
            metrics::record_trades_executed(trades.len());
            self.trade_log.lock().extend(trades.iter().cloned());
            for trade in &trades {
                self.notify_trade(trade);
            }
        }
        drop(book);

        metrics::record_order_match_duration(timer.elapsed_secs());

        info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            order_type = %order.order_type,
            status = %order.status,
            trades = trades.len(),
            filled = %order.filled_quantity,
            "order processed"
        );
        Ok((order, trades))
    }

    /// Market orders sweep the opposite side unbounded. A residual with
    /// no fills at all is cancelled rather than left pending; a partially
    /// filled residual stays partially filled but never rests.
    fn match_market(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Vec<Trade>, EngineError> {
        let trades = book.match_incoming(taker, None)?;
        if !taker.remaining_quantity.is_zero() && taker.filled_quantity.is_zero() {
            taker.cancel();
            debug!(order_id = %taker.order_id, "market order found no liquidity");
        }
        Ok(trades)
    }

    /// Limit orders match up to their limit price and rest any residual
    /// on the book, keeping the partially-filled status when fills
    /// happened on the way in.
    fn match_limit(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Vec<Trade>, EngineError> {
        let limit = taker.price.ok_or(EngineError::InvalidPrice(taker.order_type))?;
        let trades = book.match_incoming(taker, Some(limit))?;
        if !taker.remaining_quantity.is_zero() {
            if taker.status == OrderStatus::Pending {
                taker.status = OrderStatus::Open;
            }
            book.add(taker.clone())?;
        }
        Ok(trades)
    }

    /// Immediate-or-cancel: match like a limit order, cancel the
    /// residual, never rest.
    fn match_ioc(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Vec<Trade>, EngineError> {
        let limit = taker.price.ok_or(EngineError::InvalidPrice(taker.order_type))?;
        let trades = book.match_incoming(taker, Some(limit))?;
        if !taker.remaining_quantity.is_zero() {
            taker.cancel();
        }
        Ok(trades)
    }

    /// Fill-or-kill: feasibility is checked with a non-destructive scan
    /// first, so an infeasible order leaves the book untouched and
    /// produces no trades.
    fn match_fok(
        &self,
        taker: &mut Order,
        book: &mut OrderBook,
    ) -> Result<Vec<Trade>, EngineError> {
        let limit = taker.price.ok_or(EngineError::InvalidPrice(taker.order_type))?;
        if !book.can_fill(taker, limit) {
            taker.cancel();
            debug!(order_id = %taker.order_id, "fill-or-kill infeasible, killed");
            return Ok(Vec::new());
        }
        let trades = book.match_incoming(taker, Some(limit))?;
        debug_assert!(taker.remaining_quantity.is_zero());
        Ok(trades)
    }

    /// Cancel a resting order.
    ///
    /// Returns `None` when the symbol has no book or the order is not
    /// resting in it (already filled, cancelled, or never admitted).
    pub fn cancel_order(&self, order_id: Uuid, symbol: &str) -> Option<Order> {
        let book = self.books.get(symbol)?.value().clone();
        let mut book = book.lock();
        let mut order = book.remove(order_id)?;
        drop(book);

        order.cancel();
        metrics::record_order_cancelled();
        info!(order_id = %order_id, symbol = %symbol, "order cancelled");
        Some(order)
    }

    /// Depth snapshot for a symbol, creating the book on first reference.
    pub fn depth(&self, symbol: &str) -> DepthSnapshot {
        self.book(symbol).lock().snapshot()
    }

    /// BBO snapshot for a symbol, creating the book on first reference.
    pub fn bbo(&self, symbol: &str) -> BboSnapshot {
        self.book(symbol).lock().bbo()
    }

    /// Most recent trades for a symbol, newest first.
    pub fn recent_trades(&self, symbol: &str, limit: usize) -> Vec<Trade> {
        self.trade_log
            .lock()
            .iter()
            .rev()
            .filter(|t| t.symbol == symbol)
            .take(limit)
            .cloned()
            .collect()
    }

    fn notify_trade(&self, trade: &Trade) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            // A failing consumer must never take the engine down with it.
            if catch_unwind(AssertUnwindSafe(|| listener(trade))).is_err() {
                error!(trade_id = %trade.trade_id, "trade listener panicked");
            }
        }
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Side;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Order {
        Order::new("BTC-USDT", side, order_type, quantity, price, None).unwrap()
    }

    /// Book used by most scenarios:
    /// asks [51000: 1.5, 52000: 2.5], bids [49000: 1, 48000: 2].
    fn seeded_engine() -> MatchingEngine {
        let engine = MatchingEngine::new();
        for (side, quantity, price) in [
            (Side::Buy, dec!(1.0), dec!(49000)),
            (Side::Buy, dec!(2.0), dec!(48000)),
            (Side::Sell, dec!(1.5), dec!(51000)),
            (Side::Sell, dec!(2.5), dec!(52000)),
        ] {
            let (resting, trades) = engine
                .process_order(order(side, OrderType::Limit, quantity, Some(price)))
                .unwrap();
            assert_eq!(resting.status, OrderStatus::Open);
            assert!(trades.is_empty());
        }
        engine
    }

    #[test]
    fn test_market_buy_partial_exhaustion() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(51000));
        assert_eq!(trades[0].quantity, dec!(1.0));
        assert_eq!(trades[0].aggressor_side, Side::Buy);
        assert_eq!(taker.status, OrderStatus::Filled);

        let bbo = engine.bbo("BTC-USDT");
        let ask = bbo.ask.unwrap();
        assert_eq!(ask.price, "51000");
        assert_eq!(ask.qty, "0.5");
    }

    #[test]
    fn test_market_sell_hits_best_bid() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Sell, OrderType::Market, dec!(0.5), None))
            .unwrap();

        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(49000));
        assert_eq!(trades[0].aggressor_side, Side::Sell);
    }

    #[test]
    fn test_market_no_liquidity_cancelled() {
        let engine = MatchingEngine::new();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();

        assert!(trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Cancelled);
        assert_eq!(taker.filled_quantity, dec!(0));
    }

    #[test]
    fn test_market_residual_stays_partially_filled_off_book() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(5.0), None))
            .unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(taker.filled_quantity, dec!(4.0));
        assert_eq!(taker.remaining_quantity, dec!(1.0));
        // The residual never rests.
        let depth = engine.depth("BTC-USDT");
        assert!(depth.asks.is_empty());
        assert_eq!(depth.bids.len(), 2);
    }

    #[test]
    fn test_limit_buy_price_improvement() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Limit, dec!(1.0), Some(dec!(51500))))
            .unwrap();

        assert_eq!(trades.len(), 1);
        // Executes at the maker's resting price, not the taker's limit.
        assert_eq!(trades[0].price, dec!(51000));
        assert_eq!(taker.status, OrderStatus::Filled);
        assert!(engine.cancel_order(taker.order_id, "BTC-USDT").is_none());
    }

    #[test]
    fn test_limit_buy_resting() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Limit, dec!(1.0), Some(dec!(50000))))
            .unwrap();

        assert!(trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Open);

        let bbo = engine.bbo("BTC-USDT");
        let bid = bbo.bid.unwrap();
        assert_eq!(bid.price, "50000");
        assert_eq!(bid.qty, "1.0");
    }

    #[test]
    fn test_limit_partial_fill_rests_partially_filled() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Limit, dec!(2.0), Some(dec!(51000))))
            .unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, dec!(1.5));
        // The resting residual keeps its partially-filled status.
        assert_eq!(taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(taker.remaining_quantity, dec!(0.5));

        let bbo = engine.bbo("BTC-USDT");
        let bid = bbo.bid.unwrap();
        assert_eq!(bid.price, "51000");
        assert_eq!(bid.qty, "0.5");

        // Further flow fills it to completion.
        let (_, trades) = engine
            .process_order(order(Side::Sell, OrderType::Limit, dec!(0.5), Some(dec!(51000))))
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].maker_order_id, taker.order_id);
        assert!(engine.cancel_order(taker.order_id, "BTC-USDT").is_none());
    }

    #[test]
    fn test_ioc_partial_then_cancel() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Ioc, dec!(2.0), Some(dec!(51000))))
            .unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(51000));
        assert_eq!(trades[0].quantity, dec!(1.5));
        assert_eq!(taker.status, OrderStatus::Cancelled);
        assert_eq!(taker.filled_quantity, dec!(1.5));
        assert_eq!(taker.remaining_quantity, dec!(0.5));

        // Never rests; the book moved on to the next level.
        let bbo = engine.bbo("BTC-USDT");
        let ask = bbo.ask.unwrap();
        assert_eq!(ask.price, "52000");
        assert_eq!(ask.qty, "2.5");
        assert!(engine.cancel_order(taker.order_id, "BTC-USDT").is_none());
    }

    #[test]
    fn test_fok_infeasible_leaves_book_unchanged() {
        let engine = seeded_engine();
        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Fok, dec!(3.0), Some(dec!(51000))))
            .unwrap();

        assert!(trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Cancelled);
        assert_eq!(taker.filled_quantity, dec!(0));

        let bbo = engine.bbo("BTC-USDT");
        let ask = bbo.ask.unwrap();
        assert_eq!(ask.price, "51000");
        assert_eq!(ask.qty, "1.5");
    }

    #[test]
    fn test_fok_feasible_spans_levels() {
        let engine = MatchingEngine::new();
        for (quantity, price) in [(dec!(1.5), dec!(51000)), (dec!(2.5), dec!(52000))] {
            engine
                .process_order(order(Side::Sell, OrderType::Limit, quantity, Some(price)))
                .unwrap();
        }

        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Fok, dec!(3.0), Some(dec!(52000))))
            .unwrap();

        assert_eq!(taker.status, OrderStatus::Filled);
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (dec!(51000), dec!(1.5)));
        assert_eq!((trades[1].price, trades[1].quantity), (dec!(52000), dec!(1.5)));

        let total: Decimal = trades.iter().map(|t| t.quantity).sum();
        assert_eq!(total, taker.quantity);

        let bbo = engine.bbo("BTC-USDT");
        let ask = bbo.ask.unwrap();
        assert_eq!(ask.price, "52000");
        assert_eq!(ask.qty, "1.0");
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let engine = MatchingEngine::new();
        let (first, _) = engine
            .process_order(order(Side::Sell, OrderType::Limit, dec!(1.0), Some(dec!(51000))))
            .unwrap();
        let (second, _) = engine
            .process_order(order(Side::Sell, OrderType::Limit, dec!(1.0), Some(dec!(51000))))
            .unwrap();

        let (_, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.5), None))
            .unwrap();

        // The earlier arrival fills completely before the later one starts.
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].maker_order_id, first.order_id);
        assert_eq!(trades[0].quantity, dec!(1.0));
        assert_eq!(trades[1].maker_order_id, second.order_id);
        assert_eq!(trades[1].quantity, dec!(0.5));
    }

    #[test]
    fn test_cancel_resting_order() {
        let engine = seeded_engine();
        let (resting, _) = engine
            .process_order(order(Side::Buy, OrderType::Limit, dec!(1.0), Some(dec!(47000))))
            .unwrap();

        let cancelled = engine.cancel_order(resting.order_id, "BTC-USDT").unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // Gone from the book, and a second cancel finds nothing.
        assert!(engine.cancel_order(resting.order_id, "BTC-USDT").is_none());
    }

    #[test]
    fn test_cancel_unknown_returns_none() {
        let engine = seeded_engine();
        assert!(engine.cancel_order(Uuid::new_v4(), "BTC-USDT").is_none());
        // Unknown symbol never creates a book.
        assert!(engine.cancel_order(Uuid::new_v4(), "ETH-USDT").is_none());
    }

    #[test]
    fn test_resubmission_rejected() {
        let engine = seeded_engine();
        let (taker, _) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();
        assert!(matches!(
            engine.process_order(taker),
            Err(EngineError::NotPending(_))
        ));
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        use std::sync::Mutex as StdMutex;

        let engine = seeded_engine();
        let seen: Arc<StdMutex<Vec<(u8, Uuid)>>> = Arc::new(StdMutex::new(Vec::new()));
        for tag in [1u8, 2u8] {
            let seen = seen.clone();
            engine.register_trade_listener(move |trade: &Trade| {
                seen.lock().unwrap().push((tag, trade.trade_id));
            });
        }

        let (_, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(2.0), None))
            .unwrap();
        assert_eq!(trades.len(), 2);

        let seen = seen.lock().unwrap();
        // Each trade delivered to both listeners, in emission then
        // registration order.
        assert_eq!(
            *seen,
            vec![
                (1, trades[0].trade_id),
                (2, trades[0].trade_id),
                (1, trades[1].trade_id),
                (2, trades[1].trade_id),
            ]
        );
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let engine = seeded_engine();
        engine.register_trade_listener(|_trade: &Trade| panic!("boom"));

        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(taker.status, OrderStatus::Filled);
    }

    #[test]
    fn test_recent_trades_newest_first() {
        let engine = seeded_engine();
        engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();
        engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(0.5), None))
            .unwrap();

        let trades = engine.recent_trades("BTC-USDT", 10);
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, dec!(51000));
        assert_eq!(trades[0].quantity, dec!(0.5));
        assert_eq!(trades[1].quantity, dec!(1.0));

        assert_eq!(engine.recent_trades("BTC-USDT", 1).len(), 1);
        assert!(engine.recent_trades("ETH-USDT", 10).is_empty());
    }

    #[test]
    fn test_symbols_are_independent() {
        let engine = MatchingEngine::new();
        engine
            .process_order(
                Order::new("ETH-USDT", Side::Sell, OrderType::Limit, dec!(1.0), Some(dec!(3000)), None)
                    .unwrap(),
            )
            .unwrap();

        let (taker, trades) = engine
            .process_order(order(Side::Buy, OrderType::Market, dec!(1.0), None))
            .unwrap();
        assert!(trades.is_empty());
        assert_eq!(taker.status, OrderStatus::Cancelled);

        let eth = engine.bbo("ETH-USDT");
        assert_eq!(eth.ask.unwrap().price, "3000");
    }
}
