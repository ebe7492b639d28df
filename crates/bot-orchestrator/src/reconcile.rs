use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trailstop_core::{
    BrokerPosition, OrderGateway, PositionQuery, PositionState, Result, Side, TradeResult,
    TradingError,
};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    InSync,
    /// Local state was overwritten from the broker's record.
    Adopted {
        side: Side,
        quantity: Decimal,
        entry_price: Decimal,
        stop: Decimal,
        protected: bool,
    },
    /// The broker is flat while we held a position.
    ClosedExternally { trade: TradeResult },
}

impl ReconcileOutcome {
    #[must_use]
    pub const fn changed_state(&self) -> bool {
        !matches!(self, Self::InSync)
    }
}

/// Recovers local position state from the broker of record.
///
/// Adopted positions get a stop at a fixed offset from the broker's entry
/// price rather than a volatility-based one: no volatility reading from the
/// entry moment exists at this point.
#[derive(Debug, Clone)]
pub struct ReconciliationGateway {
    instrument: String,
    stop_offset: Decimal,
}

impl ReconciliationGateway {
    #[must_use]
    pub fn new(instrument: impl Into<String>, stop_offset: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            stop_offset,
        }
    }

    /// `entry - offset` for LONG, `entry + offset` for SHORT.
    #[must_use]
    pub fn recovery_stop(&self, side: Side, entry_price: Decimal) -> Option<Decimal> {
        match side {
            Side::Long => Some(entry_price - self.stop_offset),
            Side::Short => Some(entry_price + self.stop_offset),
            Side::Flat => None,
        }
    }

    /// # Errors
    ///
    /// Returns the position query error with `state` untouched, or an
    /// `InvariantViolation` if the broker record cannot be adopted.
    pub async fn reconcile(
        &self,
        state: &mut PositionState,
        positions: &dyn PositionQuery,
        orders: &dyn OrderGateway,
        last_price: Option<Decimal>,
    ) -> Result<ReconcileOutcome> {
        let broker = positions.get_open_position(&self.instrument).await?;

        match broker {
            None if state.is_flat() => Ok(ReconcileOutcome::InSync),
            None => self.record_external_close(state, orders, last_price).await,
            Some(broker) if agrees(state, &broker) => Ok(ReconcileOutcome::InSync),
            Some(broker) => self.adopt(state, &broker, orders).await,
        }
    }

    async fn record_external_close(
        &self,
        state: &mut PositionState,
        orders: &dyn OrderGateway,
        last_price: Option<Decimal>,
    ) -> Result<ReconcileOutcome> {
        let exit_price = state
            .current_stop()
            .or(last_price)
            .unwrap_or_else(|| state.entry_price());
        let orphaned = state.protective_order_id().map(str::to_string);
        let trade = state.close(exit_price, "closed at broker")?;

        // A stop left behind on a flat account would open a reverse position.
        if let Some(order_id) = orphaned {
            if let Err(e) = orders.cancel_order(&order_id).await {
                tracing::warn!(%order_id, error = %e, "failed to cancel orphaned stop order");
            }
        }

        tracing::info!(
            instrument = %self.instrument,
            side = %trade.side,
            exit = %trade.exit_price,
            pnl = %trade.pnl,
            "broker is flat, recorded externally closed position"
        );
        Ok(ReconcileOutcome::ClosedExternally { trade })
    }

    async fn adopt(
        &self,
        state: &mut PositionState,
        broker: &BrokerPosition,
        orders: &dyn OrderGateway,
    ) -> Result<ReconcileOutcome> {
        let stop = self
            .recovery_stop(broker.side, broker.entry_price)
            .ok_or_else(|| TradingError::InvariantViolation("broker reported a flat side".to_string()))?;
        let exit_side = broker
            .side
            .exit_side()
            .ok_or_else(|| TradingError::InvariantViolation("broker reported a flat side".to_string()))?;

        tracing::info!(
            instrument = %self.instrument,
            local_side = %state.side(),
            local_quantity = %state.quantity(),
            local_entry = %state.entry_price(),
            broker_side = %broker.side,
            broker_quantity = %broker.quantity,
            broker_entry = %broker.entry_price,
            "position drift detected, adopting broker state"
        );

        let superseded = state.protective_order_id().map(str::to_string);
        state.adopt(broker, stop)?;

        if let Some(order_id) = superseded {
            if let Err(e) = orders.cancel_order(&order_id).await {
                tracing::warn!(%order_id, error = %e, "failed to cancel superseded stop order");
            }
        }

        let protected = match orders
            .place_stop_order(&self.instrument, broker.quantity, exit_side, stop)
            .await
        {
            Ok(order_id) => {
                state.attach_protective_order(order_id)?;
                true
            }
            Err(e) => {
                tracing::warn!(
                    instrument = %self.instrument,
                    %stop,
                    error = %e,
                    "recovery stop placement failed, next tick retries"
                );
                false
            }
        };

        Ok(ReconcileOutcome::Adopted {
            side: broker.side,
            quantity: broker.quantity,
            entry_price: broker.entry_price,
            stop,
            protected,
        })
    }
}

fn agrees(state: &PositionState, broker: &BrokerPosition) -> bool {
    state.side() == broker.side
        && state.quantity() == broker.quantity
        && state.entry_price() == broker.entry_price
}
