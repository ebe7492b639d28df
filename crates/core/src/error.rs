//! Error taxonomy shared by every collaborator boundary.
//!
//! Each variant maps to a handling policy at the tick/reconciliation boundary:
//! transient failures wait for the next scheduled run, insufficient data skips
//! quietly, persistence failures are logged, and an expired session waits for a
//! fresh token. None of them terminate the scheduler.

use thiserror::Error;

/// Errors surfaced by the candle source, order gateway, position query and
/// checkpoint store, plus state-model violations.
#[derive(Debug, Error)]
pub enum TradingError {
    /// Network failure talking to the broker or market-data source.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Fewer candles than the indicators need.
    #[error("insufficient data: need {required} candles, got {available}")]
    InsufficientData {
        /// Bars required by the configured periods.
        required: usize,
        /// Bars actually delivered.
        available: usize,
    },

    /// Checkpoint could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Broker session is no longer valid.
    #[error("broker session expired: {0}")]
    AuthenticationExpired(String),

    /// Broker understood the request and refused it.
    #[error("broker rejected request: {0}")]
    Rejected(String),

    /// Broker answered with a payload we could not interpret.
    #[error("invalid broker response: {0}")]
    InvalidResponse(String),

    /// Position state broke one of its invariants.
    #[error("position invariant violated: {0}")]
    InvariantViolation(String),
}

impl TradingError {
    /// Creates an insufficient data error.
    #[must_use]
    pub const fn insufficient_data(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            required,
            available,
        }
    }

    /// Returns true if the failure should clear up on its own by the next run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Returns true if a fresh broker session is needed before calls can succeed.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationExpired(_))
    }

    /// Returns true for the quiet skip case that is not an alarm condition.
    #[must_use]
    pub const fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_display() {
        let err = TradingError::insufficient_data(201, 150);
        let display = err.to_string();
        assert!(display.contains("201"));
        assert!(display.contains("150"));
        assert!(err.is_insufficient_data());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_network_error_is_transient() {
        let err = TradingError::TransientNetwork("connection reset".to_string());
        assert!(err.is_transient());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_auth_error_is_not_transient() {
        let err = TradingError::AuthenticationExpired("token expired".to_string());
        assert!(err.is_auth());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("session expired"));
    }

    #[test]
    fn test_rejected_is_neither_transient_nor_auth() {
        let err = TradingError::Rejected("trigger above market".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_json_error_maps_to_persistence() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: TradingError = parse.unwrap_err().into();
        assert!(matches!(err, TradingError::Persistence(_)));
    }
}
