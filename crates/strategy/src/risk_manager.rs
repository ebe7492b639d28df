use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trailstop_core::{OrderSide, Side};

/// Broker-side effect the caller must perform before committing a stop level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopIntent {
    Place {
        side: OrderSide,
        quantity: Decimal,
        trigger: Decimal,
    },
    Modify {
        order_id: String,
        trigger: Decimal,
    },
}

/// Volatility-scaled trailing stop.
///
/// Pure computation: it never touches position state, so a failed order call
/// leaves the committed stop where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskManager {
    risk_multiple: Decimal,
}

impl RiskManager {
    #[must_use]
    pub const fn new(risk_multiple: Decimal) -> Self {
        Self { risk_multiple }
    }

    #[must_use]
    pub const fn risk_multiple(&self) -> Decimal {
        self.risk_multiple
    }

    /// Stop distance from the reference price.
    #[must_use]
    pub fn distance(&self, volatility: Decimal) -> Decimal {
        volatility * self.risk_multiple
    }

    /// `price - distance` for LONG, `price + distance` for SHORT.
    #[must_use]
    pub fn stop_from(&self, side: Side, price: Decimal, volatility: Decimal) -> Option<Decimal> {
        match side {
            Side::Long => Some(price - self.distance(volatility)),
            Side::Short => Some(price + self.distance(volatility)),
            Side::Flat => None,
        }
    }

    /// Initial stop and the placement intent for a new position.
    #[must_use]
    pub fn open_position(
        &self,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        volatility: Decimal,
    ) -> Option<(Decimal, StopIntent)> {
        let trigger = self.stop_from(side, entry_price, volatility)?;
        let exit = side.exit_side()?;
        Some((
            trigger,
            StopIntent::Place {
                side: exit,
                quantity,
                trigger,
            },
        ))
    }

    /// New stop level if the candidate improves on `current_stop`, else `None`.
    ///
    /// LONG takes `max(current, candidate)`, SHORT takes `min(current, candidate)`,
    /// so the result never loosens the stop.
    #[must_use]
    pub fn trail_stop(
        &self,
        current_stop: Decimal,
        last_price: Decimal,
        volatility: Decimal,
        side: Side,
    ) -> Option<Decimal> {
        let candidate = self.stop_from(side, last_price, volatility)?;
        let next = match side {
            Side::Long => current_stop.max(candidate),
            Side::Short => current_stop.min(candidate),
            Side::Flat => return None,
        };
        (next != current_stop).then_some(next)
    }

    /// Modify intent for a trailed stop.
    #[must_use]
    pub fn modify_intent(order_id: &str, trigger: Decimal) -> StopIntent {
        StopIntent::Modify {
            order_id: order_id.to_string(),
            trigger,
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(Decimal::from(3))
    }
}
