//! Scripted collaborators for orchestrator tests.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use trailstop_core::{
    BrokerPosition, Candle, CandleSource, CheckpointStore, EntryFill, OrderGateway, OrderSide,
    PositionQuery, Result, Side, TradingError,
};

pub fn candle(i: usize, high: Decimal, low: Decimal, close: Decimal) -> Candle {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap();
    Candle {
        timestamp: start + Duration::minutes(5 * i as i64),
        open: close,
        high,
        low,
        close,
        volume: Decimal::from(100),
    }
}

/// Constant closes with `high - low == range`, so ATR equals `range`.
pub fn flat_candles(n: usize, close: Decimal, range: Decimal) -> Vec<Candle> {
    let half = range / Decimal::TWO;
    (0..n).map(|i| candle(i, close + half, close - half, close)).collect()
}

/// Steady rise of one point per bar, then a bar closing at `breakout`.
pub fn uptrend_then_breakout(n: usize, breakout: Decimal) -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..n)
        .map(|i| {
            let close = Decimal::from(100 + i);
            candle(i, close + Decimal::ONE, close - Decimal::ONE, close)
        })
        .collect();
    candles.push(candle(n, breakout + Decimal::ONE, breakout - Decimal::ONE, breakout));
    candles
}

#[derive(Default)]
pub struct ScriptedCandles {
    candles: Mutex<Vec<Candle>>,
    fail: Mutex<bool>,
    calls: Mutex<usize>,
}

impl ScriptedCandles {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles: Mutex::new(candles),
            ..Self::default()
        }
    }

    pub fn set(&self, candles: Vec<Candle>) {
        *self.candles.lock() = candles;
    }

    pub fn fail_next(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl CandleSource for ScriptedCandles {
    async fn fetch_candles(&self, _: &str, _: &str, lookback: usize) -> Result<Vec<Candle>> {
        *self.calls.lock() += 1;
        if *self.fail.lock() {
            return Err(TradingError::TransientNetwork("candle fetch timed out".to_string()));
        }
        let candles = self.candles.lock();
        let start = candles.len().saturating_sub(lookback);
        Ok(candles[start..].to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCall {
    Entry { side: Side, quantity: Decimal },
    PlaceStop { quantity: Decimal, side: OrderSide, trigger: Decimal },
    ModifyStop { order_id: String, trigger: Decimal },
    Cancel { order_id: String },
}

/// Records every call; each kind can be switched to fail.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<OrderCall>>,
    fill_price: Mutex<Option<Decimal>>,
    fail_entry: Mutex<bool>,
    fail_place: Mutex<bool>,
    fail_modify: Mutex<bool>,
    fail_cancel: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<OrderCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&OrderCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn set_fill_price(&self, price: Decimal) {
        *self.fill_price.lock() = Some(price);
    }

    pub fn fail_entry(&self, fail: bool) {
        *self.fail_entry.lock() = fail;
    }

    pub fn fail_place(&self, fail: bool) {
        *self.fail_place.lock() = fail;
    }

    pub fn fail_modify(&self, fail: bool) {
        *self.fail_modify.lock() = fail;
    }

    pub fn fail_cancel(&self, fail: bool) {
        *self.fail_cancel.lock() = fail;
    }

    fn next_order_id(&self) -> String {
        let mut id = self.next_id.lock();
        *id += 1;
        format!("order-{id}")
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn place_entry_order(&self, _: &str, side: Side, quantity: Decimal) -> Result<EntryFill> {
        self.calls.lock().push(OrderCall::Entry { side, quantity });
        if *self.fail_entry.lock() {
            return Err(TradingError::TransientNetwork("entry timed out".to_string()));
        }
        let average_price = self
            .fill_price
            .lock()
            .ok_or_else(|| TradingError::Rejected("no fill price scripted".to_string()))?;
        Ok(EntryFill {
            order_id: self.next_order_id(),
            average_price,
        })
    }

    async fn place_stop_order(
        &self,
        _: &str,
        quantity: Decimal,
        side: OrderSide,
        trigger: Decimal,
    ) -> Result<String> {
        self.calls.lock().push(OrderCall::PlaceStop {
            quantity,
            side,
            trigger,
        });
        if *self.fail_place.lock() {
            return Err(TradingError::TransientNetwork("stop placement timed out".to_string()));
        }
        Ok(self.next_order_id())
    }

    async fn modify_stop_order(&self, order_id: &str, trigger: Decimal) -> Result<()> {
        self.calls.lock().push(OrderCall::ModifyStop {
            order_id: order_id.to_string(),
            trigger,
        });
        if *self.fail_modify.lock() {
            return Err(TradingError::TransientNetwork("modify timed out".to_string()));
        }
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.calls.lock().push(OrderCall::Cancel {
            order_id: order_id.to_string(),
        });
        if *self.fail_cancel.lock() {
            return Err(TradingError::Rejected("order already gone".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedPositions {
    position: Mutex<Option<BrokerPosition>>,
    fail: Mutex<bool>,
}

impl ScriptedPositions {
    pub fn new(position: Option<BrokerPosition>) -> Self {
        Self {
            position: Mutex::new(position),
            fail: Mutex::new(false),
        }
    }

    pub fn set(&self, position: Option<BrokerPosition>) {
        *self.position.lock() = position;
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

#[async_trait]
impl PositionQuery for ScriptedPositions {
    async fn get_open_position(&self, _: &str) -> Result<Option<BrokerPosition>> {
        if *self.fail.lock() {
            return Err(TradingError::AuthenticationExpired("session expired".to_string()));
        }
        Ok(self.position.lock().clone())
    }
}

pub struct FailingStore;

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn get(&self, _: &str) -> Result<Option<String>> {
        Err(TradingError::Persistence("disk unavailable".to_string()))
    }

    async fn set(&self, _: &str, _: &str) -> Result<()> {
        Err(TradingError::Persistence("disk full".to_string()))
    }
}
