use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub instrument: InstrumentConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub schedule: ScheduleConfig,
    pub broker: BrokerConfig,
    pub checkpoint: CheckpointConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub interval: String,
    pub candle_lookback: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub volatility_period: usize,
    pub breakout_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub risk_multiple: Decimal,
    pub quantity: Decimal,
    /// Absolute distance from entry used for the stop of an adopted position.
    pub reconcile_stop_offset: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Live,
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api_url: String,
    pub ws_url: String,
    pub execution_mode: ExecutionMode,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    pub path: PathBuf,
    /// Storage key; the instrument symbol when unset.
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            interval: "5m".to_string(),
            candle_lookback: 250,
        }
    }
}

impl StrategyConfig {
    /// One bar beyond every period: the trend pair is read one bar back and
    /// the breakout envelope excludes the current bar.
    #[must_use]
    pub fn required_bars(&self) -> usize {
        (self.fast_period + 1)
            .max(self.slow_period + 1)
            .max(self.volatility_period + 1)
            .max(self.breakout_window + 1)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_period: 50,
            slow_period: 200,
            volatility_period: 14,
            breakout_window: 10,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_multiple: Decimal::from(3),
            quantity: Decimal::ONE,
            reconcile_stop_offset: Decimal::from(20),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            reconcile_interval_secs: 300,
            reconnect_delay_secs: 5,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:9000".to_string(),
            ws_url: "ws://127.0.0.1:9000/stream".to_string(),
            execution_mode: ExecutionMode::Live,
            requests_per_second: 5,
            request_timeout_secs: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl CheckpointConfig {
    #[must_use]
    pub fn key_for(&self, symbol: &str) -> String {
        self.key.clone().unwrap_or_else(|| symbol.to_string())
    }

    /// Checkpoint directory for the file backend (`data`), database file for
    /// SQLite (`data/trailstop.db`).
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        if !self.path.as_os_str().is_empty() {
            return self.path.clone();
        }
        match self.backend {
            CheckpointBackend::Sqlite => PathBuf::from("data/trailstop.db"),
            CheckpointBackend::File | CheckpointBackend::Memory => PathBuf::from("data"),
        }
    }
}

impl AppConfig {
    /// Rejects settings the controller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.instrument.symbol.trim().is_empty() {
            bail!("instrument.symbol must not be empty");
        }

        let s = &self.strategy;
        if s.fast_period == 0 || s.slow_period == 0 || s.volatility_period == 0 {
            bail!("strategy periods must be positive");
        }
        if s.breakout_window == 0 {
            bail!("strategy.breakout_window must be positive");
        }
        if s.fast_period >= s.slow_period {
            bail!(
                "strategy.fast_period ({}) must be below slow_period ({})",
                s.fast_period,
                s.slow_period
            );
        }

        let required = self.required_bars();
        if self.instrument.candle_lookback < required {
            bail!(
                "instrument.candle_lookback ({}) must cover the {} bars the indicators need",
                self.instrument.candle_lookback,
                required
            );
        }

        if self.risk.risk_multiple <= Decimal::ZERO {
            bail!("risk.risk_multiple must be positive");
        }
        if self.risk.quantity <= Decimal::ZERO {
            bail!("risk.quantity must be positive");
        }
        if self.risk.reconcile_stop_offset <= Decimal::ZERO {
            bail!("risk.reconcile_stop_offset must be positive");
        }

        if self.schedule.tick_interval_secs == 0 || self.schedule.reconcile_interval_secs == 0 {
            bail!("schedule intervals must be positive");
        }
        if self.schedule.reconnect_delay_secs == 0 {
            bail!("schedule.reconnect_delay_secs must be positive");
        }
        if self.broker.requests_per_second == 0 {
            bail!("broker.requests_per_second must be positive");
        }

        Ok(())
    }

    /// Bars needed for one full indicator evaluation.
    #[must_use]
    pub fn required_bars(&self) -> usize {
        self.strategy.required_bars()
    }
}
