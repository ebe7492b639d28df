use crate::client::{validate_identifier, BrokerClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trailstop_core::{
    BrokerPosition, Candle, CandleSource, EntryFill, OrderGateway, OrderSide, PositionQuery,
    Result, Side, TradingError,
};

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<RawCandle>,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Decimal,
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        Self {
            timestamp: raw.timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

#[derive(Debug, Serialize)]
struct MarketOrderRequest<'a> {
    instrument: &'a str,
    side: OrderSide,
    quantity: Decimal,
}

#[derive(Debug, Serialize)]
struct StopOrderRequest<'a> {
    instrument: &'a str,
    side: OrderSide,
    quantity: Decimal,
    trigger_price: Decimal,
}

#[derive(Debug, Serialize)]
struct ModifyStopRequest {
    trigger_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct PositionEnvelope {
    position: Option<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    side: Side,
    quantity: Decimal,
    entry_price: Decimal,
}

/// Live broker adapter over the REST API.
#[derive(Debug, Clone)]
pub struct RestBroker {
    client: BrokerClient,
}

impl RestBroker {
    #[must_use]
    pub const fn new(client: BrokerClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub const fn client(&self) -> &BrokerClient {
        &self.client
    }
}

#[async_trait]
impl CandleSource for RestBroker {
    async fn fetch_candles(
        &self,
        instrument: &str,
        interval: &str,
        lookback: usize,
    ) -> Result<Vec<Candle>> {
        let query = [
            ("instrument", validate_identifier(instrument)?.to_string()),
            ("interval", interval.to_string()),
            ("limit", lookback.to_string()),
        ];
        let response: CandlesResponse = self.client.get("/candles", &query).await?;

        let mut candles: Vec<Candle> = response.candles.into_iter().map(Candle::from).collect();
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > lookback {
            candles.drain(..candles.len() - lookback);
        }
        tracing::debug!(instrument, count = candles.len(), "fetched candles");
        Ok(candles)
    }
}

#[async_trait]
impl OrderGateway for RestBroker {
    async fn place_entry_order(
        &self,
        instrument: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<EntryFill> {
        let order_side = side.entry_side().ok_or_else(|| {
            TradingError::InvariantViolation("entry order for a flat side".to_string())
        })?;
        let request = MarketOrderRequest {
            instrument: validate_identifier(instrument)?,
            side: order_side,
            quantity,
        };
        let fill: EntryFill = self.client.post("/orders/market", &request).await?;
        tracing::info!(instrument, %side, %quantity, order_id = %fill.order_id, price = %fill.average_price, "entry order filled");
        Ok(fill)
    }

    async fn place_stop_order(
        &self,
        instrument: &str,
        quantity: Decimal,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> Result<String> {
        let request = StopOrderRequest {
            instrument: validate_identifier(instrument)?,
            side,
            quantity,
            trigger_price,
        };
        let ack: OrderAck = self.client.post("/orders/stop", &request).await?;
        if ack.order_id.is_empty() {
            return Err(TradingError::InvalidResponse(
                "stop order acknowledged without an id".to_string(),
            ));
        }
        Ok(ack.order_id)
    }

    async fn modify_stop_order(&self, order_id: &str, trigger_price: Decimal) -> Result<()> {
        let path = format!("/orders/stop/{}", validate_identifier(order_id)?);
        self.client
            .put(&path, &ModifyStopRequest { trigger_price })
            .await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let path = format!("/orders/{}", validate_identifier(order_id)?);
        self.client.delete(&path).await
    }
}

#[async_trait]
impl PositionQuery for RestBroker {
    async fn get_open_position(&self, instrument: &str) -> Result<Option<BrokerPosition>> {
        let path = format!("/positions/{}", validate_identifier(instrument)?);
        let envelope: Option<PositionEnvelope> = self.client.get_optional(&path).await?;

        let position = envelope.and_then(|e| e.position).and_then(|raw| {
            // a zero-quantity record is the broker's way of saying flat
            (!raw.side.is_flat() && raw.quantity > Decimal::ZERO).then_some(BrokerPosition {
                side: raw.side,
                quantity: raw.quantity,
                entry_price: raw.entry_price,
            })
        });
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionToken;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn broker(server: &MockServer) -> RestBroker {
        let client = BrokerClient::new(
            server.uri(),
            100,
            Duration::from_secs(2),
            SessionToken::new(Some("tok".to_string())),
        )
        .unwrap();
        RestBroker::new(client)
    }

    #[tokio::test]
    async fn test_fetch_candles_sorted_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/candles"))
            .and(query_param("instrument", "NIFTY"))
            .and(query_param("limit", "2"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candles": [
                    {"timestamp": "2024-01-02T09:20:00Z", "open": "101", "high": "103", "low": "100", "close": "102", "volume": "10"},
                    {"timestamp": "2024-01-02T09:15:00Z", "open": 100, "high": 102, "low": 99, "close": 101}
                ]
            })))
            .mount(&server)
            .await;

        let candles = broker(&server).fetch_candles("NIFTY", "5m", 2).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(101));
        assert_eq!(candles[1].close, dec!(102));
        assert_eq!(candles[0].volume, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_place_stop_order_sends_exit_side() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/stop"))
            .and(body_json(serde_json::json!({
                "instrument": "NIFTY",
                "side": "SELL",
                "quantity": "1",
                "trigger_price": "970"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"order_id": "stop-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = broker(&server)
            .place_stop_order("NIFTY", dec!(1), OrderSide::Sell, dec!(970))
            .await
            .unwrap();
        assert_eq!(id, "stop-9");
    }

    #[tokio::test]
    async fn test_modify_rejected_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/orders/stop/stop-9"))
            .respond_with(ResponseTemplate::new(422).set_body_string("trigger above market"))
            .mount(&server)
            .await;

        let err = broker(&server)
            .modify_stop_order("stop-9", dec!(1020))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/market"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = broker(&server)
            .place_entry_order("NIFTY", Side::Long, dec!(1))
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orders/stop-9"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = broker(&server).cancel_order("stop-9").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_open_position_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions/NIFTY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "position": {"side": "SHORT", "quantity": "2", "entry_price": "90"}
            })))
            .mount(&server)
            .await;

        let position = broker(&server).get_open_position("NIFTY").await.unwrap();
        assert_eq!(
            position,
            Some(BrokerPosition {
                side: Side::Short,
                quantity: dec!(2),
                entry_price: dec!(90)
            })
        );
    }

    #[tokio::test]
    async fn test_missing_position_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions/NIFTY"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/positions/BANKNIFTY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"position": null})))
            .mount(&server)
            .await;

        let broker = broker(&server);
        assert!(broker.get_open_position("NIFTY").await.unwrap().is_none());
        assert!(broker.get_open_position("BANKNIFTY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = broker(&server)
            .place_stop_order("NIFTY", dec!(1), OrderSide::Buy, dec!(1030))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InvalidResponse(_)));
    }
}
