pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod position;
pub mod price_feed;
pub mod traits;

pub use config::{
    AppConfig, BrokerConfig, CheckpointBackend, CheckpointConfig, ExecutionMode,
    InstrumentConfig, RiskConfig, ScheduleConfig, ServerConfig, StrategyConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{Result, TradingError};
pub use events::{BrokerPosition, Candle, EntryFill, OrderSide, PriceTick};
pub use position::{PositionState, Side, StateTransition, TradeResult, TransitionKind};
pub use price_feed::PriceFeed;
pub use traits::{CandleSource, CheckpointStore, OrderGateway, PositionQuery};
