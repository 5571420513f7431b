//! HTTP client for the message feed server
//!
//! The server only tells clients where the feed lives and hands out user
//! accounts; reading and posting go straight to the ledger.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use messagefeed::domain::entities::MessageFeedConfig;
use messagefeed::{ClientConfig, Keypair};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user_account: String,
}

/// HTTP client for communicating with the feed server
#[derive(Clone)]
pub struct FeedServerClient {
    client: reqwest::Client,
    base_url: String,
    retry_delay: Duration,
}

impl FeedServerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Delay between attempts while the server is still loading
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch `/config.json` once
    pub async fn fetch_config(&self) -> Result<ClientConfig> {
        let response = self
            .client
            .get(format!("{}/config.json", self.base_url))
            .send()
            .await
            .context("Failed to reach feed server")?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .context("Failed to parse config response")
    }

    /// Fetch `/config.json` until the server reports a feed
    ///
    /// Retries indefinitely: the server may be bootstrapping or not up yet.
    pub async fn get_config(&self) -> (ClientConfig, MessageFeedConfig) {
        loop {
            match self.fetch_config().await {
                Ok(config) if !config.loading => match config.message_feed.clone() {
                    Some(feed) => return (config, feed),
                    None => tracing::warn!("Server finished loading without a feed"),
                },
                Ok(_) => tracing::info!("Waiting for the feed to finish loading..."),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "Unable to fetch config"),
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Log in with a local id and return the user account
    pub async fn login(&self, id: &str) -> Result<Keypair> {
        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest { id })
            .send()
            .await
            .context("Failed to reach feed server")?;
        let response = check_status(response).await?;
        let body: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;
        Keypair::from_hex(&body.user_account).context("Server returned an invalid user account")
    }
}

/// Turn a non-success response into an error carrying the body text
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("Server returned {}: {}", status, body)
}
