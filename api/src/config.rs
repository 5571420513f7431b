use std::env;

use messagefeed::domain::entities::{LoginMethod, PredictionPollConfig};
use messagefeed::Address;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Ledger JSON-RPC URL, also handed to clients
    pub ledger_url: String,
    pub commitment: String,
    pub login_method: LoginMethod,
    pub wallet_url: Option<String>,
    /// Deployed message feed program the server bootstraps feeds on
    pub message_feed_program_id: Address,
    /// Prediction poll instance, passed through to clients untouched
    pub prediction_poll: Option<PredictionPollConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", port))?,
            None => 8081,
        };

        let login_method = lookup("LOGIN_METHOD").unwrap_or_else(|| "local".to_string());
        let login_method: LoginMethod = login_method
            .parse()
            .map_err(|_| ConfigError::Invalid("LOGIN_METHOD", login_method))?;
        if login_method != LoginMethod::Local {
            return Err(ConfigError::UnsupportedLoginMethod(login_method));
        }

        let message_feed_program_id = parse_address(&lookup, "MESSAGE_FEED_PROGRAM_ID")?
            .ok_or(ConfigError::Missing("MESSAGE_FEED_PROGRAM_ID"))?;

        let prediction_poll = match (
            parse_address(&lookup, "PREDICTION_POLL_PROGRAM_ID")?,
            parse_address(&lookup, "PREDICTION_POLL_COLLECTION")?,
        ) {
            (Some(program_id), Some(collection)) => Some(PredictionPollConfig {
                program_id,
                collection,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            ledger_url: lookup("LEDGER_URL")
                .unwrap_or_else(|| "http://localhost:8899".to_string()),
            commitment: lookup("LEDGER_COMMITMENT")
                .unwrap_or_else(|| "confirmed".to_string()),
            login_method,
            wallet_url: lookup("WALLET_URL"),
            message_feed_program_id,
            prediction_poll,
        })
    }
}

fn parse_address(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Address>, ConfigError> {
    lookup(key)
        .map(|value| value.parse().map_err(|_| ConfigError::Invalid(key, value)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PROGRAM_ID: &str = "11111111111111111111111111111112";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("MESSAGE_FEED_PROGRAM_ID", PROGRAM_ID)])).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.ledger_url, "http://localhost:8899");
        assert_eq!(config.commitment, "confirmed");
        assert_eq!(config.login_method, LoginMethod::Local);
        assert_eq!(config.wallet_url, None);
        assert_eq!(config.message_feed_program_id.to_string(), PROGRAM_ID);
        assert!(config.prediction_poll.is_none());
    }

    #[test]
    fn test_program_id_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MESSAGE_FEED_PROGRAM_ID")));

        let err = Config::from_lookup(lookup(&[("MESSAGE_FEED_PROGRAM_ID", "not-base58!")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MESSAGE_FEED_PROGRAM_ID", _)));
    }

    #[test]
    fn test_only_local_login_is_supported() {
        let err = Config::from_lookup(lookup(&[
            ("MESSAGE_FEED_PROGRAM_ID", PROGRAM_ID),
            ("LOGIN_METHOD", "google"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedLoginMethod(LoginMethod::Google)
        ));

        let err = Config::from_lookup(lookup(&[
            ("MESSAGE_FEED_PROGRAM_ID", PROGRAM_ID),
            ("LOGIN_METHOD", "carrier-pigeon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("LOGIN_METHOD", _)));
    }

    #[test]
    fn test_prediction_poll_needs_both_keys() {
        let config = Config::from_lookup(lookup(&[
            ("MESSAGE_FEED_PROGRAM_ID", PROGRAM_ID),
            ("PREDICTION_POLL_PROGRAM_ID", PROGRAM_ID),
        ]))
        .unwrap();
        assert!(config.prediction_poll.is_none());

        let config = Config::from_lookup(lookup(&[
            ("MESSAGE_FEED_PROGRAM_ID", PROGRAM_ID),
            ("PREDICTION_POLL_PROGRAM_ID", PROGRAM_ID),
            ("PREDICTION_POLL_COLLECTION", PROGRAM_ID),
            ("PORT", "9000"),
            ("WALLET_URL", "https://wallet.example"),
        ]))
        .unwrap();
        assert!(config.prediction_poll.is_some());
        assert_eq!(config.port, 9000);
        assert_eq!(config.wallet_url.as_deref(), Some("https://wallet.example"));
    }
}
