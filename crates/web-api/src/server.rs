use crate::handlers;
use crate::state::AppState;
use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Read-only routes are open to browser dashboards; routes that act on
    /// the bot or replace the session token carry no CORS headers, so a
    /// cross-origin page cannot get past the preflight.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers(Any);

        let read = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/status", get(handlers::get_status))
            .layer(cors);

        let control = Router::new()
            .route("/api/reconcile", post(handlers::reconcile))
            .route("/api/session", put(handlers::put_session));

        read.merge(control)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` flips to `true`.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "status API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use trailstop_bot_orchestrator::{BotCommand, BotHandle, ReconcileOutcome, StatusSnapshot};
    use trailstop_broker::SessionToken;
    use trailstop_core::{ExecutionMode, PositionState, Side};

    /// Answers commands the way the actor would, with canned results.
    fn fake_bot(reconcile: Result<ReconcileOutcome, String>) -> BotHandle {
        let mut state = PositionState::flat("NIFTY");
        state
            .open(Side::Long, dec!(1000), dec!(1), dec!(970), Some("stop-1".to_string()))
            .unwrap();
        let snapshot = StatusSnapshot::initial(state, ExecutionMode::Paper);
        let (status_tx, status_rx) = watch::channel(snapshot);
        let (tx, mut rx) = mpsc::channel(8);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    BotCommand::Reconcile(reply) => {
                        let _ = reply.send(reconcile.clone());
                    }
                    BotCommand::GetStatus(reply) => {
                        let _ = reply.send(status_tx.borrow().clone());
                    }
                    BotCommand::Shutdown => break,
                }
            }
        });
        BotHandle::new(tx, status_rx)
    }

    fn router(bot: BotHandle, session: SessionToken) -> Router {
        ApiServer::new(AppState::new(bot, session)).router()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), SessionToken::default());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_reports_position() {
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), SessionToken::default());
        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["instrument"], "NIFTY");
        assert_eq!(json["state"]["side"], "LONG");
        assert_eq!(json["state"]["current_stop"], "970");
        assert_eq!(json["execution_mode"], "paper");
    }

    #[tokio::test]
    async fn test_reconcile_returns_outcome() {
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), SessionToken::default());
        let response = app
            .oneshot(Request::post("/api/reconcile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["outcome"], "in_sync");
    }

    #[tokio::test]
    async fn test_reconcile_failure_is_bad_gateway() {
        let app = router(
            fake_bot(Err("broker session expired".to_string())),
            SessionToken::default(),
        );
        let response = app
            .oneshot(Request::post("/api/reconcile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_put_session_replaces_token() {
        let session = SessionToken::default();
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), session.clone());
        let response = app
            .oneshot(
                Request::put("/api/session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"token":"fresh"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(session.is_set());
    }

    #[tokio::test]
    async fn test_status_allows_cross_origin_reads() {
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), SessionToken::default());
        let response = app
            .oneshot(
                Request::get("/api/status")
                    .header("origin", "http://dashboard.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_session_preflight_is_not_granted() {
        let session = SessionToken::default();
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), session.clone());
        let response = app
            .oneshot(
                Request::options("/api/session")
                    .header("origin", "http://evil.example")
                    .header("access-control-request-method", "PUT")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
        assert!(!session.is_set());
    }

    #[tokio::test]
    async fn test_put_blank_session_rejected() {
        let session = SessionToken::default();
        let app = router(fake_bot(Ok(ReconcileOutcome::InSync)), session.clone());
        let response = app
            .oneshot(
                Request::put("/api/session")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"token":"  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!session.is_set());
    }
}
