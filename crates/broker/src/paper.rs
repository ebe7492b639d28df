use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use trailstop_core::{
    BrokerPosition, EntryFill, OrderGateway, OrderSide, PositionQuery, PriceFeed, Result, Side,
    TradingError,
};

#[derive(Debug, Clone)]
struct PaperStop {
    order_id: String,
    side: OrderSide,
    trigger: Decimal,
}

#[derive(Debug, Default)]
struct PaperBook {
    position: Option<BrokerPosition>,
    stop: Option<PaperStop>,
    next_id: u64,
}

impl PaperBook {
    fn next_order_id(&mut self) -> String {
        self.next_id += 1;
        format!("paper-{}", self.next_id)
    }

    /// Flattens the position once the latest price crosses the live stop.
    fn sweep(&mut self, price: Option<Decimal>) {
        let (Some(price), Some(stop)) = (price, self.stop.as_ref()) else {
            return;
        };
        let triggered = match stop.side {
            OrderSide::Sell => price <= stop.trigger,
            OrderSide::Buy => price >= stop.trigger,
        };
        if triggered && self.position.is_some() {
            tracing::info!(order_id = %stop.order_id, trigger = %stop.trigger, %price, "paper stop triggered");
            self.position = None;
            self.stop = None;
        }
    }
}

/// In-process broker that fills at the latest streamed price.
///
/// Holds at most one position and one stop. No request leaves the process.
#[derive(Debug)]
pub struct PaperBroker {
    feed: PriceFeed,
    book: Mutex<PaperBook>,
}

impl PaperBroker {
    #[must_use]
    pub fn new(feed: PriceFeed) -> Self {
        Self {
            feed,
            book: Mutex::new(PaperBook::default()),
        }
    }

    /// Seeds an existing position, as if opened before start-up.
    pub fn seed_position(&self, position: BrokerPosition) {
        self.book.lock().position = Some(position);
    }

    #[must_use]
    pub fn stop_trigger(&self) -> Option<Decimal> {
        self.book.lock().stop.as_ref().map(|s| s.trigger)
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn place_entry_order(
        &self,
        instrument: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<EntryFill> {
        if side.is_flat() || quantity <= Decimal::ZERO {
            return Err(TradingError::Rejected(format!(
                "invalid paper entry: {side} x {quantity}"
            )));
        }
        let price = self
            .feed
            .latest_price()
            .ok_or_else(|| TradingError::Rejected("no price received yet".to_string()))?;

        let mut book = self.book.lock();
        book.sweep(Some(price));
        if book.position.is_some() {
            return Err(TradingError::Rejected("paper position already open".to_string()));
        }

        book.position = Some(BrokerPosition {
            side,
            quantity,
            entry_price: price,
        });
        let order_id = book.next_order_id();
        tracing::info!(instrument, %side, %quantity, %price, %order_id, "paper entry filled");
        Ok(EntryFill {
            order_id,
            average_price: price,
        })
    }

    async fn place_stop_order(
        &self,
        instrument: &str,
        quantity: Decimal,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> Result<String> {
        let mut book = self.book.lock();
        if book.position.is_none() {
            return Err(TradingError::Rejected("no paper position to protect".to_string()));
        }
        let order_id = book.next_order_id();
        book.stop = Some(PaperStop {
            order_id: order_id.clone(),
            side,
            trigger: trigger_price,
        });
        tracing::info!(instrument, %side, %quantity, trigger = %trigger_price, %order_id, "paper stop placed");
        Ok(order_id)
    }

    async fn modify_stop_order(&self, order_id: &str, trigger_price: Decimal) -> Result<()> {
        let mut book = self.book.lock();
        match book.stop.as_mut() {
            Some(stop) if stop.order_id == order_id => {
                stop.trigger = trigger_price;
                Ok(())
            }
            _ => Err(TradingError::Rejected(format!("unknown paper order {order_id}"))),
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut book = self.book.lock();
        if book.stop.as_ref().is_some_and(|s| s.order_id == order_id) {
            book.stop = None;
            return Ok(());
        }
        Err(TradingError::Rejected(format!("unknown paper order {order_id}")))
    }
}

#[async_trait]
impl PositionQuery for PaperBroker {
    async fn get_open_position(&self, _instrument: &str) -> Result<Option<BrokerPosition>> {
        let price = self.feed.latest_price();
        let mut book = self.book.lock();
        book.sweep(price);
        Ok(book.position.clone())
    }
}
