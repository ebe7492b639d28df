use crate::events::PriceTick;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer, many-reader cell holding the most recent traded price.
///
/// The streaming connection is the only writer. Readers never block it and
/// always observe a complete tick.
#[derive(Debug, Clone)]
pub struct PriceFeed {
    tx: Arc<watch::Sender<Option<PriceTick>>>,
}

impl PriceFeed {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, tick: PriceTick) {
        self.tx.send_replace(Some(tick));
    }

    pub fn set_price(&self, price: Decimal) {
        self.publish(PriceTick {
            price,
            timestamp: Utc::now(),
        });
    }

    /// `None` until the first tick arrives.
    #[must_use]
    pub fn latest(&self) -> Option<PriceTick> {
        *self.tx.borrow()
    }

    #[must_use]
    pub fn latest_price(&self) -> Option<Decimal> {
        self.latest().map(|tick| tick.price)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<PriceTick>> {
        self.tx.subscribe()
    }
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}
