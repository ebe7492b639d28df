use crate::bot_handle::BotHandle;
use crate::commands::{BotCommand, StatusSnapshot, TickOutcome};
use crate::trader::Trader;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use trailstop_core::ExecutionMode;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub tick_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Schedule {
    #[must_use]
    pub const fn from_config(config: &trailstop_core::ScheduleConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs),
            reconcile_interval: Duration::from_secs(config.reconcile_interval_secs),
        }
    }
}

/// Single task that owns the [`Trader`].
///
/// Ticks, scheduled reconciliation and external commands are multiplexed on
/// one `select!`, which makes this task the only writer of position state.
pub struct BotActor {
    trader: Trader,
    rx: mpsc::Receiver<BotCommand>,
    status_tx: watch::Sender<StatusSnapshot>,
    schedule: Schedule,
    execution_mode: ExecutionMode,
    last_tick: Option<TickOutcome>,
    last_tick_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl BotActor {
    #[must_use]
    pub fn new(
        trader: Trader,
        rx: mpsc::Receiver<BotCommand>,
        status_tx: watch::Sender<StatusSnapshot>,
        schedule: Schedule,
        execution_mode: ExecutionMode,
    ) -> Self {
        Self {
            trader,
            rx,
            status_tx,
            schedule,
            execution_mode,
            last_tick: None,
            last_tick_at: None,
            last_error: None,
        }
    }

    /// Spawns the actor on the runtime and returns its handle.
    #[must_use]
    pub fn spawn(trader: Trader, schedule: Schedule, execution_mode: ExecutionMode) -> (BotHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let initial = StatusSnapshot::initial(trader.state().clone(), execution_mode);
        let (status_tx, status_rx) = watch::channel(initial);

        let actor = Self::new(trader, rx, status_tx, schedule, execution_mode);
        let join = tokio::spawn(actor.run());
        (BotHandle::new(tx, status_rx), join)
    }

    fn snapshot(&self) -> StatusSnapshot {
        let state = self.trader.state().clone();
        let last_price = self.trader.last_price();
        let unrealized_pnl = last_price.map_or(rust_decimal::Decimal::ZERO, |p| state.unrealized_pnl(p));
        StatusSnapshot {
            instrument: self.trader.instrument().to_string(),
            state,
            last_price,
            unrealized_pnl,
            last_tick_at: self.last_tick_at,
            last_tick: self.last_tick.clone(),
            last_error: self.last_error.clone(),
            execution_mode: self.execution_mode,
            updated_at: Utc::now(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    async fn handle_tick(&mut self) {
        let outcome = self.trader.run_tick().await;
        self.last_error = match &outcome {
            TickOutcome::Aborted { error } => Some(error.clone()),
            _ => None,
        };
        self.last_tick = Some(outcome);
        self.last_tick_at = Some(Utc::now());
        self.publish();
    }

    async fn handle_reconcile(&mut self) -> Result<crate::ReconcileOutcome, String> {
        let result = self.trader.reconcile().await.map_err(|e| e.to_string());
        match &result {
            Ok(outcome) => tracing::debug!(?outcome, "reconciliation complete"),
            Err(e) => self.last_error = Some(e.clone()),
        }
        self.publish();
        result
    }

    /// Runs until `Shutdown` arrives or every handle is dropped, then writes a
    /// final checkpoint.
    pub async fn run(mut self) {
        tracing::info!(instrument = %self.trader.instrument(), mode = ?self.execution_mode, "bot starting");

        // Broker state is authoritative before the first trading decision.
        let _ = self.handle_reconcile().await;

        let mut ticks = tokio::time::interval(self.schedule.tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reconciles = tokio::time::interval_at(
            tokio::time::Instant::now() + self.schedule.reconcile_interval,
            self.schedule.reconcile_interval,
        );
        reconciles.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = self.rx.recv() => match cmd {
                    Some(BotCommand::Reconcile(reply)) => {
                        let result = self.handle_reconcile().await;
                        let _ = reply.send(result);
                    }
                    Some(BotCommand::GetStatus(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(BotCommand::Shutdown) | None => {
                        tracing::info!(instrument = %self.trader.instrument(), "bot shutting down");
                        break;
                    }
                },
                _ = reconciles.tick() => {
                    let _ = self.handle_reconcile().await;
                }
                _ = ticks.tick() => self.handle_tick().await,
            }
        }

        self.trader.persist().await;
        self.publish();
        tracing::info!(instrument = %self.trader.instrument(), "bot stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryStore;
    use crate::position_store::PositionStore;
    use crate::reconcile::ReconcileOutcome;
    use crate::test_support::{flat_candles, RecordingGateway, ScriptedCandles, ScriptedPositions};
    use crate::trader::{Collaborators, TraderSettings};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use trailstop_core::{BrokerPosition, CheckpointStore, PriceFeed, Side};
    use trailstop_strategy::{IndicatorEngine, RiskManager};

    fn trader(positions: Arc<ScriptedPositions>, backend: Arc<MemoryStore>) -> Trader {
        let settings = TraderSettings {
            instrument: "NIFTY".to_string(),
            interval: "5m".to_string(),
            candle_lookback: 50,
            quantity: dec!(1),
            engine: IndicatorEngine::new(2, 4, 2, 2),
            risk: RiskManager::new(dec!(3)),
            reconcile_stop_offset: dec!(20),
        };
        Trader::new(
            settings,
            Collaborators {
                candles: Arc::new(ScriptedCandles::new(flat_candles(3, dec!(100), dec!(2)))),
                orders: Arc::new(RecordingGateway::new()),
                positions,
            },
            PositionStore::new(backend, "NIFTY", "NIFTY"),
            PriceFeed::new(),
            trailstop_core::PositionState::flat("NIFTY"),
        )
    }

    fn slow_schedule() -> Schedule {
        Schedule {
            tick_interval: Duration::from_secs(3600),
            reconcile_interval: Duration::from_secs(3600),
        }
    }

    async fn first_tick(handle: &BotHandle) -> StatusSnapshot {
        let mut rx = handle.subscribe_status();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.last_tick.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        status
    }

    #[tokio::test]
    async fn test_startup_reconciles_before_trading() {
        let positions = Arc::new(ScriptedPositions::new(Some(BrokerPosition {
            side: Side::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
        })));
        let backend = Arc::new(MemoryStore::new());
        let (handle, join) = BotActor::spawn(
            trader(positions, backend.clone()),
            slow_schedule(),
            ExecutionMode::Paper,
        );

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.state.side(), Side::Long);
        assert_eq!(status.state.current_stop(), Some(dec!(80)));
        assert_eq!(status.execution_mode, ExecutionMode::Paper);

        let ticked = first_tick(&handle).await;
        assert!(matches!(ticked.last_tick, Some(TickOutcome::Skipped { .. })));
        assert_eq!(ticked.state.side(), Side::Long);

        assert_eq!(handle.reconcile().await.unwrap(), ReconcileOutcome::InSync);

        handle.shutdown().await.unwrap();
        join.await.unwrap();
        assert!(backend.get("NIFTY").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reconcile_failure_reported_to_caller() {
        let positions = Arc::new(ScriptedPositions::new(None));
        let backend = Arc::new(MemoryStore::new());
        let (handle, join) = BotActor::spawn(
            trader(positions.clone(), backend),
            slow_schedule(),
            ExecutionMode::Live,
        );

        first_tick(&handle).await;
        positions.fail(true);
        let err = handle.reconcile().await.unwrap_err();
        assert!(err.to_string().contains("session expired"));
        assert!(handle.latest_status().last_error.is_some());

        drop(handle);
        join.await.unwrap();
    }
}
