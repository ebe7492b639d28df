use crate::commands::{BotCommand, StatusSnapshot};
use crate::reconcile::ReconcileOutcome;
use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch};

/// Cloneable front door to a running [`BotActor`](crate::BotActor).
#[derive(Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<BotCommand>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl BotHandle {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<BotCommand>, status_rx: watch::Receiver<StatusSnapshot>) -> Self {
        Self { tx, status_rx }
    }

    /// Runs a reconciliation pass on the actor and waits for its outcome.
    ///
    /// # Errors
    /// Returns an error if the actor is gone or the pass failed.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BotCommand::Reconcile(tx)).await?;
        rx.await?.map_err(|e| anyhow!(e))
    }

    /// Gets the current status of the bot.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent or the response cannot be received.
    pub async fn get_status(&self) -> Result<StatusSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(BotCommand::GetStatus(tx)).await?;
        let status = rx.await?;
        Ok(status)
    }

    /// Last published snapshot, without a round trip to the actor.
    #[must_use]
    pub fn latest_status(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    /// Shuts down the bot.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the bot actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(BotCommand::Shutdown).await?;
        Ok(())
    }
}
