//! The `/config.json` document shared by the server and its clients

use serde::{Deserialize, Serialize};

use super::address::Address;

/// How users obtain an author account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// The server creates an account for any `{id}` it is given
    Local,
    Google,
}

impl std::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginMethod::Local => write!(f, "local"),
            LoginMethod::Google => write!(f, "google"),
        }
    }
}

impl std::str::FromStr for LoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(LoginMethod::Local),
            "google" => Ok(LoginMethod::Google),
            _ => Err(format!("Unknown login method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFeedConfig {
    pub program_id: Address,
    #[serde(alias = "firstMessage")]
    pub first_message_key: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionPollConfig {
    pub program_id: Address,
    pub collection: Address,
}

/// Response body of `GET /config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// True while the server is still bootstrapping the feed
    pub loading: bool,
    /// Ledger JSON-RPC URL
    pub url: String,
    #[serde(default)]
    pub commitment: Option<String>,
    pub login_method: LoginMethod,
    #[serde(default)]
    pub wallet_url: Option<String>,
    pub message_feed: Option<MessageFeedConfig>,
    #[serde(default)]
    pub prediction_poll: Option<PredictionPollConfig>,
}
