use crate::commands::TickOutcome;
use crate::position_store::PositionStore;
use crate::reconcile::{ReconcileOutcome, ReconciliationGateway};
use rust_decimal::Decimal;
use std::sync::Arc;
use trailstop_core::{
    AppConfig, CandleSource, OrderGateway, PositionQuery, PositionState, PriceFeed, Result, Side,
    TradingError,
};
use trailstop_strategy::{IndicatorEngine, IndicatorSnapshot, RiskManager, SignalEvaluator, StopIntent};

/// Static trading parameters for one instrument.
#[derive(Debug, Clone)]
pub struct TraderSettings {
    pub instrument: String,
    pub interval: String,
    pub candle_lookback: usize,
    pub quantity: Decimal,
    pub engine: IndicatorEngine,
    pub risk: RiskManager,
    pub reconcile_stop_offset: Decimal,
}

impl TraderSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            instrument: config.instrument.symbol.clone(),
            interval: config.instrument.interval.clone(),
            candle_lookback: config.instrument.candle_lookback,
            quantity: config.risk.quantity,
            engine: IndicatorEngine::from_config(&config.strategy),
            risk: RiskManager::new(config.risk.risk_multiple),
            reconcile_stop_offset: config.risk.reconcile_stop_offset,
        }
    }
}

/// Broker-facing collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub candles: Arc<dyn CandleSource>,
    pub orders: Arc<dyn OrderGateway>,
    pub positions: Arc<dyn PositionQuery>,
}

/// Owns the position state and runs ticks and reconciliation passes against it.
///
/// Every method takes `&mut self`, so whoever owns the trader serializes all
/// mutations. State is only committed after the broker confirmed the
/// corresponding order.
pub struct Trader {
    settings: TraderSettings,
    evaluator: SignalEvaluator,
    reconciler: ReconciliationGateway,
    collaborators: Collaborators,
    store: PositionStore,
    feed: PriceFeed,
    state: PositionState,
}

impl Trader {
    #[must_use]
    pub fn new(
        settings: TraderSettings,
        collaborators: Collaborators,
        store: PositionStore,
        feed: PriceFeed,
        state: PositionState,
    ) -> Self {
        let reconciler =
            ReconciliationGateway::new(settings.instrument.clone(), settings.reconcile_stop_offset);
        Self {
            settings,
            evaluator: SignalEvaluator::new(),
            reconciler,
            collaborators,
            store,
            feed,
            state,
        }
    }

    /// Builds a trader from the last checkpoint (flat if none).
    pub async fn restore(
        settings: TraderSettings,
        collaborators: Collaborators,
        store: PositionStore,
        feed: PriceFeed,
    ) -> Self {
        let state = store.load().await;
        Self::new(settings, collaborators, store, feed, state)
    }

    #[must_use]
    pub const fn state(&self) -> &PositionState {
        &self.state
    }

    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.settings.instrument
    }

    #[must_use]
    pub fn last_price(&self) -> Option<Decimal> {
        self.feed.latest_price()
    }

    /// Checkpoints the current state; failures are logged by the store.
    pub async fn persist(&self) -> bool {
        self.store.save(&self.state).await
    }

    /// Runs one evaluation tick. Errors never escape: they become
    /// `Skipped` or `Aborted` and the next tick tries again.
    pub async fn run_tick(&mut self) -> TickOutcome {
        let outcome = match self.try_tick().await {
            Ok(outcome) => outcome,
            Err(TradingError::InsufficientData {
                required,
                available,
            }) => {
                tracing::debug!(instrument = %self.settings.instrument, required, available, "not enough candles, skipping tick");
                TickOutcome::Skipped {
                    required,
                    available,
                }
            }
            Err(e) => {
                log_failure("tick", &e);
                TickOutcome::Aborted {
                    error: e.to_string(),
                }
            }
        };
        tracing::info!(instrument = %self.settings.instrument, ?outcome, "tick complete");
        outcome
    }

    /// Runs one reconciliation pass and checkpoints any correction.
    ///
    /// # Errors
    ///
    /// Returns the collaborator error; the state is unchanged in that case.
    pub async fn reconcile(&mut self) -> Result<ReconcileOutcome> {
        let last_price = self.feed.latest_price();
        let result = self
            .reconciler
            .reconcile(
                &mut self.state,
                self.collaborators.positions.as_ref(),
                self.collaborators.orders.as_ref(),
                last_price,
            )
            .await;

        match &result {
            Ok(outcome) if outcome.changed_state() => {
                self.persist().await;
            }
            Ok(_) => tracing::debug!(instrument = %self.settings.instrument, "position in sync with broker"),
            Err(e) => log_failure("reconciliation", e),
        }
        result
    }

    async fn try_tick(&mut self) -> Result<TickOutcome> {
        let candles = self
            .collaborators
            .candles
            .fetch_candles(
                &self.settings.instrument,
                &self.settings.interval,
                self.settings.candle_lookback,
            )
            .await?;
        let snapshot = self.settings.engine.compute(&candles)?;

        if self.state.is_flat() {
            self.try_enter(&snapshot).await
        } else {
            self.try_trail(&snapshot).await
        }
    }

    async fn try_enter(&mut self, snapshot: &IndicatorSnapshot) -> Result<TickOutcome> {
        let Some(side) = self.evaluator.evaluate(snapshot) else {
            return Ok(TickOutcome::NoSignal);
        };
        let instrument = self.settings.instrument.clone();
        let quantity = self.settings.quantity;

        tracing::info!(%instrument, %side, close = %snapshot.last_close, high = %snapshot.recent_high, low = %snapshot.recent_low, "entry signal");
        let fill = self
            .collaborators
            .orders
            .place_entry_order(&instrument, side, quantity)
            .await?;

        let (stop, intent) = self
            .settings
            .risk
            .open_position(side, fill.average_price, quantity, snapshot.volatility)
            .ok_or_else(|| TradingError::InvariantViolation(format!("no stop for side {side}")))?;

        // The fill is real: commit the position even if the stop cannot be placed yet.
        let order_id = match self.execute(&instrument, intent).await {
            Ok(order_id) => order_id,
            Err(e) => {
                tracing::warn!(%instrument, %stop, error = %e, "initial stop placement failed, next tick retries");
                None
            }
        };
        let protected = order_id.is_some();

        self.state
            .open(side, fill.average_price, quantity, stop, order_id)?;
        self.persist().await;

        tracing::info!(%instrument, %side, entry = %fill.average_price, %stop, protected, "position opened");
        Ok(TickOutcome::Entered {
            side,
            entry_price: fill.average_price,
            stop,
            protected,
        })
    }

    async fn try_trail(&mut self, snapshot: &IndicatorSnapshot) -> Result<TickOutcome> {
        let side = self.state.side();
        let current = self
            .state
            .current_stop()
            .ok_or_else(|| TradingError::InvariantViolation(format!("{side} position without a stop")))?;

        let replaced = if self.state.protective_order_id().is_none() {
            self.replace_missing_stop(side, current).await?;
            true
        } else {
            false
        };

        let last_price = self.feed.latest_price().unwrap_or(snapshot.last_close);
        let Some(next) = self
            .settings
            .risk
            .trail_stop(current, last_price, snapshot.volatility, side)
        else {
            return Ok(if replaced {
                TickOutcome::StopPlaced { stop: current }
            } else {
                TickOutcome::StopUnchanged { stop: current }
            });
        };

        let order_id = self
            .state
            .protective_order_id()
            .map(str::to_string)
            .ok_or_else(|| TradingError::InvariantViolation("trailing without a protective order".to_string()))?;
        self.execute(
            &self.settings.instrument,
            RiskManager::modify_intent(&order_id, next),
        )
        .await?;

        self.state.tighten_stop(next)?;
        self.persist().await;

        tracing::info!(instrument = %self.settings.instrument, %side, from = %current, to = %next, %last_price, "stop trailed");
        Ok(TickOutcome::StopTrailed {
            from: current,
            to: next,
        })
    }

    async fn replace_missing_stop(&mut self, side: Side, stop: Decimal) -> Result<()> {
        let exit = side
            .exit_side()
            .ok_or_else(|| TradingError::InvariantViolation("flat position has no exit side".to_string()))?;
        let intent = StopIntent::Place {
            side: exit,
            quantity: self.state.quantity(),
            trigger: stop,
        };
        let instrument = self.settings.instrument.clone();
        if let Some(order_id) = self.execute(&instrument, intent).await? {
            self.state.attach_protective_order(order_id)?;
            self.persist().await;
            tracing::info!(%instrument, %stop, "protective stop placed");
        }
        Ok(())
    }

    /// Performs the broker side effect for a stop intent. Returns the new order
    /// id for placements.
    async fn execute(&self, instrument: &str, intent: StopIntent) -> Result<Option<String>> {
        let orders = &self.collaborators.orders;
        match intent {
            StopIntent::Place {
                side,
                quantity,
                trigger,
            } => orders
                .place_stop_order(instrument, quantity, side, trigger)
                .await
                .map(Some),
            StopIntent::Modify { order_id, trigger } => {
                orders.modify_stop_order(&order_id, trigger).await?;
                Ok(None)
            }
        }
    }
}

fn log_failure(activity: &str, err: &TradingError) {
    match err {
        TradingError::TransientNetwork(_) => {
            tracing::warn!(activity, error = %err, "transient failure, waiting for next run");
        }
        TradingError::AuthenticationExpired(_) => {
            tracing::error!(activity, error = %err, "broker session expired, waiting for a new token");
        }
        TradingError::InvariantViolation(_) => {
            tracing::error!(activity, error = %err, "position invariant violated");
        }
        TradingError::InsufficientData { .. } => {
            tracing::debug!(activity, error = %err, "insufficient data");
        }
        TradingError::Persistence(_) | TradingError::Rejected(_) | TradingError::InvalidResponse(_) => {
            tracing::warn!(activity, error = %err, "aborted");
        }
    }
}
