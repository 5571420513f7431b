//! Client config handler

use axum::{extract::State, Json};
use messagefeed::{ClientConfig, Ledger};

use crate::AppState;

/// GET /config.json
///
/// Where clients find the ledger and the current feed. `loading` stays true
/// and `messageFeed` null until a feed exists.
pub async fn get_config<L: Ledger + 'static>(
    State(state): State<AppState<L>>,
) -> Json<ClientConfig> {
    let meta = state.feed.meta().await;

    Json(ClientConfig {
        loading: meta.is_none(),
        url: state.config.ledger_url.clone(),
        commitment: Some(state.config.commitment.clone()),
        login_method: state.config.login_method,
        wallet_url: state.config.wallet_url.clone(),
        message_feed: meta.map(|meta| meta.client_config()),
        prediction_poll: state.config.prediction_poll.clone(),
    })
}
