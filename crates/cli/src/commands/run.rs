use super::{load_config, open_checkpoint_store};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use trailstop_bot_orchestrator::{
    BotActor, Collaborators, ExecutionVenue, PositionStore, Schedule, Trader, TraderSettings,
};
use trailstop_broker::{BrokerClient, PaperBroker, PriceStream, RestBroker, SessionToken};
use trailstop_core::{ExecutionMode, PriceFeed};
use trailstop_web_api::{ApiServer, AppState};

pub async fn run(config_path: &Path, profile: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path, profile)?;

    let session = SessionToken::from_env();
    if !session.is_set() {
        tracing::warn!(
            "no broker session token set; broker calls fail until one is supplied via PUT /api/session"
        );
    }

    let client = BrokerClient::new(
        config.broker.api_url.clone(),
        config.broker.requests_per_second,
        Duration::from_secs(config.broker.request_timeout_secs),
        session.clone(),
    )?;
    let market = Arc::new(RestBroker::new(client.clone()));
    let feed = PriceFeed::new();

    let venue = Arc::new(match config.broker.execution_mode {
        ExecutionMode::Live => ExecutionVenue::Live(RestBroker::new(client)),
        ExecutionMode::Paper => ExecutionVenue::Paper(PaperBroker::new(feed.clone())),
    });
    let mode = venue.mode();

    let checkpoints = open_checkpoint_store(&config).await?;
    let store = PositionStore::new(
        checkpoints,
        config.checkpoint.key_for(&config.instrument.symbol),
        config.instrument.symbol.clone(),
    );

    let collaborators = Collaborators {
        candles: market,
        orders: venue.clone(),
        positions: venue,
    };
    let trader = Trader::restore(
        TraderSettings::from_config(&config),
        collaborators,
        store,
        feed.clone(),
    )
    .await;

    let (handle, bot_task) = BotActor::spawn(trader, Schedule::from_config(&config.schedule), mode);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream = PriceStream::new(
        config.broker.ws_url.clone(),
        config.instrument.symbol.clone(),
        feed,
        Duration::from_secs(config.schedule.reconnect_delay_secs),
    );
    let stream_task = tokio::spawn(stream.run(shutdown_rx.clone()));

    let server = ApiServer::new(AppState::new(handle.clone(), session));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(&addr, shutdown_rx).await {
            tracing::error!(error = %e, "status API stopped");
        }
    });

    tracing::info!(
        instrument = %config.instrument.symbol,
        execution_mode = ?mode,
        "controller running"
    );

    wait_for_shutdown_signal().await?;

    tracing::info!("shutting down");
    if let Err(e) = handle.shutdown().await {
        tracing::error!(error = %e, "bot already stopped");
    }
    let _ = shutdown_tx.send(true);

    bot_task.await.context("bot task panicked")?;
    stream_task.await.context("price stream task panicked")?;
    server_task.await.context("status API task panicked")?;

    tracing::info!("controller stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl+C")?;
            tracing::info!("received Ctrl+C");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("listening for Ctrl+C")?;
    tracing::info!("received Ctrl+C");
    Ok(())
}
