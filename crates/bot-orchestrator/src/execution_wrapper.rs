use async_trait::async_trait;
use rust_decimal::Decimal;
use trailstop_broker::{PaperBroker, RestBroker};
use trailstop_core::{
    BrokerPosition, EntryFill, ExecutionMode, OrderGateway, OrderSide, PositionQuery, Result, Side,
};

/// Order routing for the configured execution mode.
///
/// The paper variant holds no broker client at all, so a paper run cannot
/// reach the live order endpoints.
pub enum ExecutionVenue {
    Live(RestBroker),
    Paper(PaperBroker),
}

impl ExecutionVenue {
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        match self {
            Self::Live(_) => ExecutionMode::Live,
            Self::Paper(_) => ExecutionMode::Paper,
        }
    }
}

#[async_trait]
impl OrderGateway for ExecutionVenue {
    async fn place_entry_order(
        &self,
        instrument: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<EntryFill> {
        match self {
            Self::Live(broker) => broker.place_entry_order(instrument, side, quantity).await,
            Self::Paper(broker) => broker.place_entry_order(instrument, side, quantity).await,
        }
    }

    async fn place_stop_order(
        &self,
        instrument: &str,
        quantity: Decimal,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> Result<String> {
        match self {
            Self::Live(broker) => {
                broker
                    .place_stop_order(instrument, quantity, side, trigger_price)
                    .await
            }
            Self::Paper(broker) => {
                broker
                    .place_stop_order(instrument, quantity, side, trigger_price)
                    .await
            }
        }
    }

    async fn modify_stop_order(&self, order_id: &str, trigger_price: Decimal) -> Result<()> {
        match self {
            Self::Live(broker) => broker.modify_stop_order(order_id, trigger_price).await,
            Self::Paper(broker) => broker.modify_stop_order(order_id, trigger_price).await,
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        match self {
            Self::Live(broker) => broker.cancel_order(order_id).await,
            Self::Paper(broker) => broker.cancel_order(order_id).await,
        }
    }
}

#[async_trait]
impl PositionQuery for ExecutionVenue {
    async fn get_open_position(&self, instrument: &str) -> Result<Option<BrokerPosition>> {
        match self {
            Self::Live(broker) => broker.get_open_position(instrument).await,
            Self::Paper(broker) => broker.get_open_position(instrument).await,
        }
    }
}
