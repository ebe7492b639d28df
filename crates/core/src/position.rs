use crate::error::{Result, TradingError};
use crate::events::{BrokerPosition, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of the tracked position. `Flat` is the only state without exposure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[default]
    #[serde(rename = "NONE")]
    Flat,
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
}

impl Side {
    #[must_use]
    pub const fn is_flat(self) -> bool {
        matches!(self, Self::Flat)
    }

    /// Order side that opens this position.
    #[must_use]
    pub const fn entry_side(self) -> Option<OrderSide> {
        match self {
            Self::Long => Some(OrderSide::Buy),
            Self::Short => Some(OrderSide::Sell),
            Self::Flat => None,
        }
    }

    /// Order side of the protective stop that closes this position.
    #[must_use]
    pub const fn exit_side(self) -> Option<OrderSide> {
        match self {
            Self::Long => Some(OrderSide::Sell),
            Self::Short => Some(OrderSide::Buy),
            Self::Flat => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "NONE"),
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// A closed trade in the `PnL` ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResult {
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
    pub reason: String,
}

impl TradeResult {
    #[must_use]
    pub fn new(
        side: Side,
        quantity: Decimal,
        entry_price: Decimal,
        exit_price: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        let pnl = match side {
            Side::Long => (exit_price - entry_price) * quantity,
            Side::Short => (entry_price - exit_price) * quantity,
            Side::Flat => Decimal::ZERO,
        };

        Self {
            side,
            quantity,
            entry_price,
            exit_price,
            pnl,
            closed_at: Utc::now(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Opened,
    StopPlaced,
    StopTightened,
    Reconciled,
    Closed,
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub at: DateTime<Utc>,
    pub kind: TransitionKind,
    pub side: Side,
    pub quantity: Decimal,
    pub stop: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The in-process record of the open position for one instrument.
///
/// Fields are only reachable through the transition methods so that every
/// mutation keeps the flat-state and monotonic-stop invariants. Ledger fields
/// default when absent, which keeps older checkpoints loadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    instrument: String,
    side: Side,
    entry_price: Decimal,
    quantity: Decimal,
    current_stop: Option<Decimal>,
    protective_order_id: Option<String>,
    #[serde(default)]
    realized_pnl: Decimal,
    #[serde(default)]
    pnl_history: Vec<TradeResult>,
    #[serde(default)]
    history: Vec<StateTransition>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl PositionState {
    /// Fresh flat state for an instrument.
    #[must_use]
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            side: Side::Flat,
            entry_price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            current_stop: None,
            protective_order_id: None,
            realized_pnl: Decimal::ZERO,
            pnl_history: Vec::new(),
            history: Vec::new(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn is_flat(&self) -> bool {
        self.side.is_flat()
    }

    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    #[must_use]
    pub const fn current_stop(&self) -> Option<Decimal> {
        self.current_stop
    }

    #[must_use]
    pub fn protective_order_id(&self) -> Option<&str> {
        self.protective_order_id.as_deref()
    }

    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    #[must_use]
    pub fn pnl_history(&self) -> &[TradeResult] {
        &self.pnl_history
    }

    #[must_use]
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Mark-to-market `PnL` of the open position, zero when flat.
    #[must_use]
    pub fn unrealized_pnl(&self, last_price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (last_price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - last_price) * self.quantity,
            Side::Flat => Decimal::ZERO,
        }
    }

    /// Records a new position. `protective_order_id` is `None` when the stop
    /// could not be placed yet.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if already positioned, if `side` is flat, or
    /// if the quantity is not positive.
    pub fn open(
        &mut self,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        stop: Decimal,
        protective_order_id: Option<String>,
    ) -> Result<()> {
        if !self.is_flat() {
            return Err(TradingError::InvariantViolation(format!(
                "cannot open {side} while already {}",
                self.side
            )));
        }
        Self::validate_exposure(side, quantity)?;

        self.side = side;
        self.entry_price = entry_price;
        self.quantity = quantity;
        self.current_stop = Some(stop);
        self.push_transition(TransitionKind::Opened, None);

        if let Some(order_id) = protective_order_id {
            self.attach_protective_order(order_id)?;
        }
        Ok(())
    }

    /// Records that the broker confirmed a stop order at `current_stop`.
    ///
    /// # Errors
    /// Returns `InvariantViolation` when flat.
    pub fn attach_protective_order(&mut self, order_id: impl Into<String>) -> Result<()> {
        if self.is_flat() {
            return Err(TradingError::InvariantViolation(
                "protective order on a flat position".to_string(),
            ));
        }
        let order_id = order_id.into();
        self.protective_order_id = Some(order_id.clone());
        self.push_transition(TransitionKind::StopPlaced, Some(order_id));
        Ok(())
    }

    /// Moves the stop in the trade's favour.
    ///
    /// # Errors
    /// Returns `InvariantViolation` when flat or when `new_stop` would loosen
    /// the current stop.
    pub fn tighten_stop(&mut self, new_stop: Decimal) -> Result<()> {
        let loosens = match (self.side, self.current_stop) {
            (Side::Flat, _) => {
                return Err(TradingError::InvariantViolation(
                    "trailing a flat position".to_string(),
                ))
            }
            (_, None) => false,
            (Side::Long, Some(current)) => new_stop < current,
            (Side::Short, Some(current)) => new_stop > current,
        };
        if loosens {
            return Err(TradingError::InvariantViolation(format!(
                "stop {new_stop} would loosen {} stop {:?}",
                self.side, self.current_stop
            )));
        }

        self.current_stop = Some(new_stop);
        self.push_transition(TransitionKind::StopTightened, None);
        Ok(())
    }

    /// Overwrites the position with the broker's record and a recovery stop.
    /// Any previous protective order is forgotten; the caller re-places one.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the broker record has no exposure.
    pub fn adopt(&mut self, broker: &BrokerPosition, stop: Decimal) -> Result<()> {
        Self::validate_exposure(broker.side, broker.quantity)?;

        let note = format!(
            "was {} qty={} entry={}",
            self.side, self.quantity, self.entry_price
        );
        self.side = broker.side;
        self.quantity = broker.quantity;
        self.entry_price = broker.entry_price;
        self.current_stop = Some(stop);
        self.protective_order_id = None;
        self.push_transition(TransitionKind::Reconciled, Some(note));
        Ok(())
    }

    /// Closes the position at `exit_price`, appends the trade to the ledger and
    /// returns to flat.
    ///
    /// # Errors
    /// Returns `InvariantViolation` when already flat.
    pub fn close(&mut self, exit_price: Decimal, reason: &str) -> Result<TradeResult> {
        if self.is_flat() {
            return Err(TradingError::InvariantViolation(
                "closing a flat position".to_string(),
            ));
        }

        let trade = TradeResult::new(
            self.side,
            self.quantity,
            self.entry_price,
            exit_price,
            reason,
        );
        self.record_trade(trade.clone());

        self.side = Side::Flat;
        self.entry_price = Decimal::ZERO;
        self.quantity = Decimal::ZERO;
        self.current_stop = None;
        self.protective_order_id = None;
        self.push_transition(TransitionKind::Closed, Some(reason.to_string()));
        Ok(trade)
    }

    /// Appends a closed trade and folds its `PnL` into the running total.
    pub fn record_trade(&mut self, trade: TradeResult) {
        self.realized_pnl += trade.pnl;
        self.pnl_history.push(trade);
        self.updated_at = Some(Utc::now());
    }

    /// Checks the flat-state invariants.
    ///
    /// # Errors
    /// Returns `InvariantViolation` describing the first broken rule.
    pub fn check_invariants(&self) -> Result<()> {
        if self.is_flat() {
            if !self.quantity.is_zero() {
                return Err(TradingError::InvariantViolation(format!(
                    "flat with quantity {}",
                    self.quantity
                )));
            }
            if self.current_stop.is_some() {
                return Err(TradingError::InvariantViolation(
                    "flat with a stop level".to_string(),
                ));
            }
            if self.protective_order_id.is_some() {
                return Err(TradingError::InvariantViolation(
                    "flat with a protective order".to_string(),
                ));
            }
        } else {
            if self.quantity <= Decimal::ZERO {
                return Err(TradingError::InvariantViolation(format!(
                    "{} with quantity {}",
                    self.side, self.quantity
                )));
            }
            if self.current_stop.is_none() {
                return Err(TradingError::InvariantViolation(format!(
                    "{} without a stop level",
                    self.side
                )));
            }
        }
        Ok(())
    }

    fn validate_exposure(side: Side, quantity: Decimal) -> Result<()> {
        if side.is_flat() {
            return Err(TradingError::InvariantViolation(
                "position side must be LONG or SHORT".to_string(),
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(TradingError::InvariantViolation(format!(
                "position quantity must be positive, got {quantity}"
            )));
        }
        Ok(())
    }

    fn push_transition(&mut self, kind: TransitionKind, note: Option<String>) {
        let now = Utc::now();
        self.history.push(StateTransition {
            at: now,
            kind,
            side: self.side,
            quantity: self.quantity,
            stop: self.current_stop,
            note,
        });
        self.updated_at = Some(now);
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
    }
}
