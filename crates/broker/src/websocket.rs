use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use trailstop_core::{PriceFeed, PriceTick};

#[derive(Debug, Deserialize)]
struct TradeMessage {
    instrument: String,
    price: Decimal,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Parses a trade update for `instrument`; other payloads yield `None`.
#[must_use]
pub fn parse_trade(text: &str, instrument: &str) -> Option<PriceTick> {
    let msg: TradeMessage = serde_json::from_str(text).ok()?;
    (msg.instrument == instrument).then(|| PriceTick {
        price: msg.price,
        timestamp: msg.timestamp.unwrap_or_else(Utc::now),
    })
}

/// Long-lived streaming connection that keeps [`PriceFeed`] current.
///
/// On disconnect it waits a fixed delay, reconnects and re-subscribes. The
/// shutdown receiver is the only way to stop it.
pub struct PriceStream {
    ws_url: String,
    instrument: String,
    feed: PriceFeed,
    reconnect_delay: Duration,
}

impl PriceStream {
    #[must_use]
    pub fn new(
        ws_url: impl Into<String>,
        instrument: impl Into<String>,
        feed: PriceFeed,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            instrument: instrument.into(),
            feed,
            reconnect_delay,
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.session() => match result {
                    Ok(()) => tracing::warn!(url = %self.ws_url, "price stream closed by server"),
                    Err(e) => tracing::warn!(url = %self.ws_url, error = %e, "price stream disconnected"),
                },
                _ = shutdown.changed() => break,
            }

            tracing::info!(delay_secs = self.reconnect_delay.as_secs(), "reconnecting price stream");
            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!(instrument = %self.instrument, "price stream stopped");
    }

    /// One connection lifetime: connect, subscribe, publish until closed.
    async fn session(&self) -> Result<()> {
        let (mut ws, response) = connect_async(self.ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", self.ws_url))?;
        tracing::info!(url = %self.ws_url, status = %response.status(), "price stream connected");

        let subscribe = serde_json::json!({
            "action": "subscribe",
            "instrument": self.instrument,
        });
        ws.send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send subscription")?;

        while let Some(msg) = ws.next().await {
            match msg.context("price stream read failed")? {
                Message::Text(text) => {
                    if let Some(tick) = parse_trade(&text, &self.instrument) {
                        tracing::trace!(price = %tick.price, "price tick");
                        self.feed.publish(tick);
                    }
                }
                Message::Ping(_) => tracing::trace!("received ping"),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "close frame received");
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }
}
