//! Transient user-facing notifications and block explorer links

use serde::Serialize;

use crate::domain::entities::Signature;

const LOCAL_EXPLORER_URL: &str = "http://localhost:3000";

/// Outcome of a user action, shown briefly and then discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Notification {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            signature: None,
        }
    }

    pub fn with_signature(text: impl Into<String>, signature: Signature) -> Self {
        Self {
            text: text.into(),
            signature: Some(signature),
        }
    }

    /// Explorer link for the transaction this notification refers to
    pub fn transaction_url(&self, cluster_url: &str) -> Option<String> {
        self.signature
            .as_ref()
            .map(|signature| transaction_url(cluster_url, signature))
    }
}

/// Block explorer base URL for a cluster
///
/// `https://<prefix>testnet.solana.com` maps to
/// `https://<prefix>explorer.solana.com`; anything else uses the local explorer.
pub fn explorer_url(cluster_url: &str) -> String {
    cluster_url
        .strip_prefix("https://")
        .and_then(|rest| rest.trim_end_matches('/').strip_suffix("testnet.solana.com"))
        .map(|prefix| format!("https://{}explorer.solana.com", prefix))
        .unwrap_or_else(|| LOCAL_EXPLORER_URL.to_string())
}

pub fn transaction_url(cluster_url: &str, signature: &Signature) -> String {
    format!("{}/tx/{}", explorer_url(cluster_url), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explorer_url_mapping() {
        assert_eq!(explorer_url("http://localhost:8899"), "http://localhost:3000");
        assert_eq!(
            explorer_url("https://testnet.solana.com"),
            "https://explorer.solana.com"
        );
        assert_eq!(
            explorer_url("https://beta.testnet.solana.com/"),
            "https://beta.explorer.solana.com"
        );
        assert_eq!(
            explorer_url("https://api.mainnet.example.com"),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_transaction_url() {
        let signature = Signature::new([7; 64]);
        let notification = Notification::with_signature("Message posted", signature);
        assert_eq!(
            notification.transaction_url("https://testnet.solana.com").unwrap(),
            format!("https://explorer.solana.com/tx/{}", signature)
        );
        assert_eq!(Notification::new("You are banned").transaction_url("x"), None);
    }

    #[test]
    fn test_serialize_skips_missing_signature() {
        let json = serde_json::to_value(Notification::new("You are banned")).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "You are banned" }));
    }
}
