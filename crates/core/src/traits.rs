use crate::error::Result;
use crate::events::{BrokerPosition, Candle, EntryFill, OrderSide};
use crate::position::Side;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Historical bars for the indicator window.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Returns up to `lookback` candles, oldest first.
    async fn fetch_candles(
        &self,
        instrument: &str,
        interval: &str,
        lookback: usize,
    ) -> Result<Vec<Candle>>;
}

/// Order placement at the broker. Every call is a single attempt; retries are
/// left to the next scheduled tick.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_entry_order(
        &self,
        instrument: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<EntryFill>;

    /// Places a stop-market order and returns the broker's order id.
    async fn place_stop_order(
        &self,
        instrument: &str,
        quantity: Decimal,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> Result<String>;

    async fn modify_stop_order(&self, order_id: &str, trigger_price: Decimal) -> Result<()>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;
}

/// Broker's view of open positions.
#[async_trait]
pub trait PositionQuery: Send + Sync {
    /// `Ok(None)` means the broker reports no open position.
    async fn get_open_position(&self, instrument: &str) -> Result<Option<BrokerPosition>>;
}

/// Durable key/value storage for the position checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
