//! Login handler

use axum::{extract::State, Json};
use messagefeed::Ledger;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Request body for local login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Hex encoded 64-byte keypair of the user account
    pub user_account: String,
}

/// POST /login
///
/// Returns the user account for `id`, creating it on first login.
pub async fn login<L: Ledger + 'static>(
    State(state): State<AppState<L>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let meta = state.feed.meta().await.ok_or(AppError::Loading)?;
    let user = state.logins.login(&request.id, &meta).await?;

    Ok(Json(LoginResponse {
        user_account: user.to_hex(),
    }))
}
