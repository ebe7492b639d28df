//! Pure indicator functions over a candle series (oldest first).
//!
//! Every function returns `None` rather than a partial value when the input is
//! shorter than its period.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trailstop_core::{Candle, Result, StrategyConfig, TradingError};

/// Exponential moving average series.
///
/// Seeded with the simple average of the first `period` values, then
/// `ema = alpha * value + (1 - alpha) * prev` with `alpha = 2 / (period + 1)`.
/// Element `k` of the result corresponds to `values[period - 1 + k]`.
#[must_use]
pub fn ema_series(values: &[Decimal], period: usize) -> Option<Vec<Decimal>> {
    if period == 0 || values.len() < period {
        return None;
    }

    let alpha = Decimal::TWO / Decimal::from(period + 1);
    let seed = values[..period].iter().sum::<Decimal>() / Decimal::from(period);

    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);
    let mut prev = seed;
    for value in &values[period..] {
        prev = alpha * value + (Decimal::ONE - alpha) * prev;
        series.push(prev);
    }
    Some(series)
}

#[must_use]
pub fn true_range(candle: &Candle, prev_close: Decimal) -> Decimal {
    let hl = candle.high - candle.low;
    let hc = (candle.high - prev_close).abs();
    let lc = (candle.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Wilder's average true range as of the last candle.
///
/// True range starts at bar 1; needs `period + 1` candles.
#[must_use]
pub fn atr(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let ranges: Vec<Decimal> = candles
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .collect();

    let p = Decimal::from(period);
    let mut value = ranges[..period].iter().sum::<Decimal>() / p;
    for tr in &ranges[period..] {
        value = (value * (p - Decimal::ONE) + tr) / p;
    }
    Some(value)
}

/// Highest high and lowest low of the `window` bars before the last one.
#[must_use]
pub fn breakout_envelope(candles: &[Candle], window: usize) -> Option<(Decimal, Decimal)> {
    if window == 0 || candles.len() < window + 1 {
        return None;
    }

    let end = candles.len() - 1;
    let prior = &candles[end - window..end];
    let high = prior.iter().map(|c| c.high).max()?;
    let low = prior.iter().map(|c| c.low).min()?;
    Some((high, low))
}

/// Everything the signal evaluator and risk manager read from one tick's candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub fast_prev: Decimal,
    pub slow_prev: Decimal,
    pub fast_last: Decimal,
    pub slow_last: Decimal,
    pub volatility: Decimal,
    pub recent_high: Decimal,
    pub recent_low: Decimal,
    pub last_close: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorEngine {
    fast_period: usize,
    slow_period: usize,
    volatility_period: usize,
    breakout_window: usize,
}

impl IndicatorEngine {
    #[must_use]
    pub const fn new(
        fast_period: usize,
        slow_period: usize,
        volatility_period: usize,
        breakout_window: usize,
    ) -> Self {
        Self {
            fast_period,
            slow_period,
            volatility_period,
            breakout_window,
        }
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.fast_period,
            config.slow_period,
            config.volatility_period,
            config.breakout_window,
        )
    }

    /// Bars needed for the previous trend values and a full envelope.
    #[must_use]
    pub fn required_bars(&self) -> usize {
        StrategyConfig {
            fast_period: self.fast_period,
            slow_period: self.slow_period,
            volatility_period: self.volatility_period,
            breakout_window: self.breakout_window,
        }
        .required_bars()
    }

    /// Computes the snapshot for the last candle.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` when the series is shorter than
    /// [`required_bars`](Self::required_bars).
    pub fn compute(&self, candles: &[Candle]) -> Result<IndicatorSnapshot> {
        let required = self.required_bars();
        let insufficient = || TradingError::insufficient_data(required, candles.len());
        if candles.len() < required {
            return Err(insufficient());
        }

        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let fast = ema_series(&closes, self.fast_period).ok_or_else(insufficient)?;
        let slow = ema_series(&closes, self.slow_period).ok_or_else(insufficient)?;
        let (fast_prev, fast_last) = last_two(&fast).ok_or_else(insufficient)?;
        let (slow_prev, slow_last) = last_two(&slow).ok_or_else(insufficient)?;

        let volatility = atr(candles, self.volatility_period).ok_or_else(insufficient)?;
        let (recent_high, recent_low) =
            breakout_envelope(candles, self.breakout_window).ok_or_else(insufficient)?;
        let last_close = *closes.last().ok_or_else(insufficient)?;

        Ok(IndicatorSnapshot {
            fast_prev,
            slow_prev,
            fast_last,
            slow_last,
            volatility,
            recent_high,
            recent_low,
            last_close,
        })
    }
}

fn last_two(series: &[Decimal]) -> Option<(Decimal, Decimal)> {
    match series {
        [.., prev, last] => Some((*prev, *last)),
        _ => None,
    }
}
