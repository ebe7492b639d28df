use crate::indicators::IndicatorSnapshot;
use rust_decimal::Decimal;
use trailstop_core::Side;

/// Raw entry conditions for one tick, before the tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryConditions {
    pub long: bool,
    pub short: bool,
}

impl EntryConditions {
    /// LONG is checked first and wins when both hold.
    #[must_use]
    pub const fn resolve(self) -> Option<Side> {
        if self.long {
            Some(Side::Long)
        } else if self.short {
            Some(Side::Short)
        } else {
            None
        }
    }
}

/// Trend-confirmed breakout entry rule.
///
/// The trend is read one bar back (`fast[-2]` against `slow[-2]`) and the
/// breakout on the latest close against the envelope of the prior bars.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalEvaluator;

impl SignalEvaluator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn conditions(&self, snapshot: &IndicatorSnapshot) -> EntryConditions {
        Self::conditions_from(
            snapshot.fast_prev,
            snapshot.slow_prev,
            snapshot.last_close,
            snapshot.recent_high,
            snapshot.recent_low,
        )
    }

    #[must_use]
    pub fn conditions_from(
        fast_prev: Decimal,
        slow_prev: Decimal,
        close: Decimal,
        recent_high: Decimal,
        recent_low: Decimal,
    ) -> EntryConditions {
        EntryConditions {
            long: fast_prev > slow_prev && close > recent_high,
            short: fast_prev < slow_prev && close < recent_low,
        }
    }

    /// Entry side for a flat position, if any.
    #[must_use]
    pub fn evaluate(&self, snapshot: &IndicatorSnapshot) -> Option<Side> {
        self.conditions(snapshot).resolve()
    }
}
