pub mod bot_actor;
pub mod bot_handle;
pub mod checkpoint;
pub mod commands;
pub mod execution_wrapper;
pub mod position_store;
pub mod reconcile;
pub mod trader;

#[cfg(test)]
mod test_support;

pub use bot_actor::{BotActor, Schedule};
pub use bot_handle::BotHandle;
pub use checkpoint::{JsonFileStore, MemoryStore, SqliteStore};
pub use commands::{BotCommand, StatusSnapshot, TickOutcome};
pub use execution_wrapper::ExecutionVenue;
pub use position_store::PositionStore;
pub use reconcile::{ReconcileOutcome, ReconciliationGateway};
pub use trader::{Collaborators, Trader, TraderSettings};
