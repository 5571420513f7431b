//! Message Feed API Server
//!
//! Bootstraps a message feed on a deployed program and tells clients where to
//! find it. Clients read and post directly against the ledger; the server only
//! serves `/config.json` and hands out user accounts through `/login`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Json, Router,
};
use messagefeed::adapters::RpcLedger;
use messagefeed::Ledger;
use serde::Serialize;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod config;
mod error;
mod handlers;

use app::{FeedController, LoginService};
use config::Config;

/// Application state shared across all handlers
pub struct AppState<L: Ledger> {
    pub feed: Arc<FeedController<L>>,
    pub logins: Arc<LoginService<L>>,
    pub config: Arc<Config>,
}

impl<L: Ledger> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
            logins: self.logins.clone(),
            config: self.config.clone(),
        }
    }
}

impl<L: Ledger + 'static> AppState<L> {
    pub fn new(ledger: Arc<L>, config: Config) -> Self {
        Self {
            feed: Arc::new(FeedController::new(
                ledger.clone(),
                config.message_feed_program_id,
            )),
            logins: Arc::new(LoginService::new(ledger)),
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the router; `rate_limit_login` needs peer addresses from the listener
pub fn router<L: Ledger + 'static>(state: AppState<L>, rate_limit_login: bool) -> Router {
    let mut login_routes = Router::new().route("/login", post(handlers::login::<L>));
    if rate_limit_login {
        // 2 req/sec sustained, burst of 5 per client IP
        let governor_config = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(PeerIpKeyExtractor)
                .per_second(2)
                .burst_size(5)
                .finish()
                .expect("Failed to build governor config"),
        );
        login_routes = login_routes.layer(GovernorLayer {
            config: governor_config,
        });
    }

    Router::new()
        .route("/health", get(health))
        .route("/config.json", get(handlers::get_config::<L>))
        .merge(login_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,messagefeed_api=debug,messagefeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Message Feed API...");

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(login_method = %config.login_method, "Login method");
    tracing::info!(url = %config.ledger_url, commitment = %config.commitment, "Cluster RPC URL");

    let ledger = Arc::new(
        RpcLedger::new(config.ledger_url.clone(), config.commitment.clone())
            .context("Failed to build ledger client")?,
    );
    let port = config.port;
    let state = AppState::new(ledger, config);

    // Create the feed right away so the first client doesn't wait as long
    state.feed.spawn_reload();

    let app = router(state, true);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum_test::TestServer;
    use messagefeed::adapters::InMemoryLedger;
    use messagefeed::{Address, FeedReader, Keypair};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> (Arc<InMemoryLedger>, Address, AppState<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let program_id = ledger.deploy_message_feed_program();
        let config = Config::from_lookup(|key| match key {
            "MESSAGE_FEED_PROGRAM_ID" => Some(program_id.to_string()),
            "WALLET_URL" => Some("https://wallet.example".to_string()),
            _ => None,
        })
        .unwrap();
        (ledger.clone(), program_id, AppState::new(ledger, config))
    }

    async fn wait_until_loaded(server: &TestServer) -> Value {
        for _ in 0..100 {
            let body: Value = server.get("/config.json").await.json();
            if body["loading"] == false {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed never finished loading");
    }

    #[tokio::test]
    async fn test_health() {
        let (_ledger, _program_id, state) = test_state();
        let response = router(state, false)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_config_reports_loading_then_feed() {
        let (_ledger, program_id, state) = test_state();
        let server = TestServer::new(router(state, false)).unwrap();

        let response = server.get("/config.json").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["loading"], true);
        assert!(body["messageFeed"].is_null());
        assert_eq!(body["loginMethod"], "local");
        assert_eq!(body["url"], "http://localhost:8899");
        assert_eq!(body["commitment"], "confirmed");
        assert_eq!(body["walletUrl"], "https://wallet.example");
        assert!(body["predictionPoll"].is_null());

        let body = wait_until_loaded(&server).await;
        assert_eq!(body["messageFeed"]["programId"], program_id.to_string());
        assert!(body["messageFeed"]["firstMessageKey"].is_string());
    }

    #[tokio::test]
    async fn test_config_recovers_from_cluster_reset() {
        let (ledger, _program_id, state) = test_state();
        let old = state.feed.reload().await.unwrap();
        let server = TestServer::new(router(state, false)).unwrap();

        let body: Value = server.get("/config.json").await.json();
        assert_eq!(
            body["messageFeed"]["firstMessageKey"],
            old.first_message.address().to_string()
        );

        ledger.remove_account(&old.first_message.address());
        let body: Value = server.get("/config.json").await.json();
        assert_eq!(body["loading"], true);

        let body = wait_until_loaded(&server).await;
        assert_ne!(
            body["messageFeed"]["firstMessageKey"],
            old.first_message.address().to_string()
        );
    }

    #[tokio::test]
    async fn test_login_while_loading() {
        let (_ledger, _program_id, state) = test_state();
        let server = TestServer::new(router(state, false)).unwrap();

        let response = server.post("/login").json(&json!({ "id": "alice" })).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "Loading");
    }

    #[tokio::test]
    async fn test_login_returns_same_account_per_id() {
        let (ledger, _program_id, state) = test_state();
        state.feed.reload().await.unwrap();
        let server = TestServer::new(router(state, false)).unwrap();

        let response = server.post("/login").json(&json!({ "id": "alice" })).await;
        response.assert_status_ok();
        let body: Value = response.json();
        let hex = body["userAccount"].as_str().unwrap().to_string();
        assert_eq!(hex.len(), 128);

        let user = Keypair::from_hex(&hex).unwrap();
        let reader = FeedReader::new(ledger);
        assert!(!reader.is_banned(&user.address()).await.unwrap());

        let again: Value = server
            .post("/login")
            .json(&json!({ "id": "alice" }))
            .await
            .json();
        assert_eq!(again["userAccount"], hex);

        let other: Value = server
            .post("/login")
            .json(&json!({ "id": "bob" }))
            .await
            .json();
        assert_ne!(other["userAccount"], hex);
    }

    #[tokio::test]
    async fn test_login_rejects_malformed_body() {
        let (_ledger, _program_id, state) = test_state();
        state.feed.reload().await.unwrap();
        let server = TestServer::new(router(state, false)).unwrap();

        let response = server.post("/login").json(&json!({ "name": "alice" })).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let response = server.post("/login").json(&json!({ "id": "" })).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
