use trailstop_bot_orchestrator::BotHandle;
use trailstop_broker::SessionToken;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub bot: BotHandle,
    pub session: SessionToken,
}

impl AppState {
    #[must_use]
    pub const fn new(bot: BotHandle, session: SessionToken) -> Self {
        Self { bot, session }
    }
}
