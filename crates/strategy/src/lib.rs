pub mod indicators;
pub mod risk_manager;
pub mod trend_breakout;

pub use indicators::{IndicatorEngine, IndicatorSnapshot};
pub use risk_manager::{RiskManager, StopIntent};
pub use trend_breakout::{EntryConditions, SignalEvaluator};
