use crate::reconcile::ReconcileOutcome;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use trailstop_core::{ExecutionMode, PositionState, Side};

#[derive(Debug)]
pub enum BotCommand {
    /// Run a reconciliation pass now and report its outcome.
    Reconcile(oneshot::Sender<Result<ReconcileOutcome, String>>),
    GetStatus(oneshot::Sender<StatusSnapshot>),
    Shutdown,
}

/// What one evaluation tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Not enough candles for the indicators.
    Skipped { required: usize, available: usize },
    NoSignal,
    Entered {
        side: Side,
        entry_price: Decimal,
        stop: Decimal,
        protected: bool,
    },
    /// A missing protective order was placed at the current stop.
    StopPlaced { stop: Decimal },
    StopTrailed { from: Decimal, to: Decimal },
    StopUnchanged { stop: Decimal },
    /// A collaborator call failed. The stop was not advanced, though a
    /// missing protective order placed earlier in the same tick stays
    /// attached and checkpointed.
    Aborted { error: String },
}

/// Read-only view published after every tick and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub instrument: String,
    pub state: PositionState,
    pub last_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick: Option<TickOutcome>,
    pub last_error: Option<String>,
    pub execution_mode: ExecutionMode,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn initial(state: PositionState, execution_mode: ExecutionMode) -> Self {
        Self {
            instrument: state.instrument().to_string(),
            state,
            last_price: None,
            unrealized_pnl: Decimal::ZERO,
            last_tick_at: None,
            last_tick: None,
            last_error: None,
            execution_mode,
            updated_at: Utc::now(),
        }
    }
}
