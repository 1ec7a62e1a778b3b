//! Order API Handlers
//!
//! Order entry and cancellation endpoints. Wire shapes use lowercase
//! string enums, decimal strings, and ISO-8601 UTC timestamps with a
//! trailing `Z`; semantic validation lives in `Order::new`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::engine::{datetime_as_iso8601, Order, OrderStatus, OrderType, Side};
use crate::utils::response::{AppError, AppJson};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 32))]
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    #[validate(length(min = 1, max = 64))]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    #[serde(with = "datetime_as_iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "datetime_as_iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub remaining_quantity: Decimal,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            price: order.price,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
            filled_quantity: order.filled_quantity,
            remaining_quantity: order.remaining_quantity,
        }
    }
}

/// Create a new order
/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::bad_request("INVALID_REQUEST", &e.to_string()))?;

    let order = Order::new(
        &req.symbol,
        req.side,
        req.order_type,
        req.quantity,
        req.price,
        req.client_order_id,
    )?;

    let (order, trades) = state.engine.process_order(order)?;
    tracing::debug!(
        order_id = %order.order_id,
        trades = trades.len(),
        "order request completed"
    );
    Ok(Json(OrderResponse::from(&order)))
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderQuery {
    pub symbol: String,
}

/// Cancel a resting order
/// DELETE /api/orders/:order_id?symbol=S
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<CancelOrderQuery>,
) -> Result<Json<OrderResponse>, AppError> {
    match state.engine.cancel_order(order_id, &query.symbol) {
        Some(order) => Ok(Json(OrderResponse::from(&order))),
        None => Err(AppError::not_found("Order not found")),
    }
}
