//! JSON-RPC ledger client implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::entities::{Address, Blockhash, Keypair, Signature, Transaction};
use crate::domain::ports::{Account, Ledger};
use crate::error::LedgerError;

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger reached over its JSON-RPC 2.0 HTTP endpoint
pub struct RpcLedger {
    http: Client,
    url: String,
    commitment: String,
    confirm_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>, commitment: impl Into<String>) -> Result<Self, LedgerError> {
        Self::with_request_timeout(url, commitment, REQUEST_TIMEOUT)
    }

    /// Like `new`, giving up on any single RPC call after `timeout`
    pub fn with_request_timeout(
        url: impl Into<String>,
        commitment: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: url.into(),
            commitment: commitment.into(),
            confirm_timeout: Duration::from_secs(30),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::trace!(method, "ledger rpc call");

        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rpc {
                code: i64::from(status.as_u16()),
                message,
            });
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Deserialization(format!("{}: {}", method, e)))?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        body.result
            .ok_or_else(|| LedgerError::Deserialization(format!("{}: missing result", method)))
    }

    async fn latest_blockhash(&self) -> Result<Blockhash, LedgerError> {
        let response: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        parse(&response.value.blockhash)
    }

    /// Poll signature status until it reaches the configured commitment
    async fn confirm(&self, signature: &Signature) -> Result<(), LedgerError> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            let response: WithContext<Vec<Option<SignatureStatus>>> = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature.to_string()], { "searchTransactionHistory": false }]),
                )
                .await?;

            if let Some(Some(status)) = response.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(LedgerError::TransactionFailed(err.to_string()));
                }
                let reached = status
                    .confirmation_status
                    .as_deref()
                    .map(commitment_rank)
                    .unwrap_or(0);
                if reached >= commitment_rank(&self.commitment) {
                    return Ok(());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::Timeout(format!(
                    "transaction {} not confirmed",
                    signature
                )));
            }
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

fn commitment_rank(commitment: &str) -> u8 {
    match commitment {
        "finalized" | "max" | "root" => 2,
        "confirmed" | "single" | "singleGossip" => 1,
        _ => 0,
    }
}

fn parse<T>(s: &str) -> Result<T, LedgerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e: T::Err| LedgerError::Deserialization(format!("{}: {}", s, e)))
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
struct RpcAccount {
    lamports: u64,
    owner: String,
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<String>,
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_account(&self, address: &Address) -> Result<Option<Account>, LedgerError> {
        let response: WithContext<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": "base64", "commitment": self.commitment }]),
            )
            .await?;

        response
            .value
            .map(|account| {
                let (payload, encoding) = account.data;
                if encoding != "base64" {
                    return Err(LedgerError::Deserialization(format!(
                        "unexpected account encoding {}",
                        encoding
                    )));
                }
                Ok(Account {
                    lamports: account.lamports,
                    owner: parse(&account.owner)?,
                    data: STANDARD
                        .decode(payload)
                        .map_err(|e| LedgerError::Deserialization(e.to_string()))?,
                })
            })
            .transpose()
    }

    async fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, LedgerError> {
        self.call(
            "getMinimumBalanceForRentExemption",
            json!([data_len, { "commitment": self.commitment }]),
        )
        .await
    }

    async fn fee_per_signature(&self) -> Result<u64, LedgerError> {
        // Fee of a message with a single signer and no instructions
        let blockhash = self.latest_blockhash().await?;
        let message = Transaction::new(Address::new([1; 32])).compile(blockhash);
        let response: WithContext<Option<u64>> = self
            .call(
                "getFeeForMessage",
                json!([STANDARD.encode(message.serialize()), { "commitment": self.commitment }]),
            )
            .await?;
        response
            .value
            .ok_or_else(|| LedgerError::Deserialization("fee unavailable for blockhash".to_string()))
    }

    async fn balance(&self, address: &Address) -> Result<u64, LedgerError> {
        let response: WithContext<u64> = self
            .call(
                "getBalance",
                json!([address.to_string(), { "commitment": self.commitment }]),
            )
            .await?;
        Ok(response.value)
    }

    async fn request_airdrop(
        &self,
        address: &Address,
        lamports: u64,
    ) -> Result<Signature, LedgerError> {
        let signature: String = self
            .call("requestAirdrop", json!([address.to_string(), lamports]))
            .await?;
        let signature = parse(&signature)?;
        self.confirm(&signature).await?;
        tracing::debug!(%address, lamports, "airdrop confirmed");
        Ok(signature)
    }

    async fn send_and_confirm(
        &self,
        transaction: &Transaction,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError> {
        let blockhash = self.latest_blockhash().await?;
        let signed = transaction.sign(blockhash, signers)?;
        let expected = signed
            .id()
            .ok_or_else(|| LedgerError::TransactionFailed("transaction has no signers".to_string()))?;

        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    STANDARD.encode(signed.serialize()),
                    { "encoding": "base64", "preflightCommitment": self.commitment }
                ]),
            )
            .await?;
        let signature: Signature = parse(&signature)?;
        if signature != expected {
            tracing::warn!(%signature, %expected, "ledger returned an unexpected signature");
        }

        self.confirm(&signature).await?;
        tracing::debug!(%signature, "transaction confirmed");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, routing::post, Json, Router};

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    /// Serve canned JSON-RPC results keyed by method name
    async fn mock_rpc(results: HashMap<&'static str, Value>) -> (String, Calls) {
        let calls: Calls = Arc::default();
        let results = Arc::new(results);

        let app = Router::new().route(
            "/",
            post({
                let calls = calls.clone();
                move |State(results): State<Arc<HashMap<&'static str, Value>>>,
                      Json(request): Json<Value>| {
                    let calls = calls.clone();
                    async move {
                        let method = request["method"].as_str().unwrap_or_default().to_string();
                        calls
                            .lock()
                            .unwrap()
                            .push((method.clone(), request["params"].clone()));
                        let body = match results.get(method.as_str()) {
                            Some(result) => json!({"jsonrpc": "2.0", "id": request["id"], "result": result}),
                            None => json!({
                                "jsonrpc": "2.0",
                                "id": request["id"],
                                "error": {"code": -32601, "message": "Method not found"}
                            }),
                        };
                        Json(body)
                    }
                }
            }),
        )
        .with_state(results);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    #[tokio::test]
    async fn test_get_account_decodes_base64() {
        let owner = Address::new([4; 32]);
        let (url, calls) = mock_rpc(HashMap::from([(
            "getAccountInfo",
            json!({
                "context": {"slot": 1},
                "value": {
                    "lamports": 42,
                    "owner": owner.to_string(),
                    "data": [STANDARD.encode([1u8, 2, 3]), "base64"],
                    "executable": false,
                    "rentEpoch": 0
                }
            }),
        )]))
        .await;

        let ledger = RpcLedger::new(url, "confirmed").unwrap();
        let account = ledger
            .get_account(&Address::new([9; 32]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.lamports, 42);
        assert_eq!(account.owner, owner);
        assert_eq!(account.data, vec![1, 2, 3]);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1[0], Address::new([9; 32]).to_string());
        assert_eq!(calls[0].1[1]["encoding"], "base64");
    }

    #[tokio::test]
    async fn test_missing_account_is_none() {
        let (url, _) = mock_rpc(HashMap::from([(
            "getAccountInfo",
            json!({"context": {"slot": 1}, "value": null}),
        )]))
        .await;

        let ledger = RpcLedger::new(url, "confirmed").unwrap();
        assert!(ledger
            .get_account(&Address::new([9; 32]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let (url, _) = mock_rpc(HashMap::new()).await;
        let ledger = RpcLedger::new(url, "confirmed").unwrap();

        let err = ledger.balance(&Address::new([1; 32])).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_stalled_call_times_out() {
        let app = Router::new().route(
            "/",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Json(json!({"jsonrpc": "2.0", "id": 1, "result": 0}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let ledger =
            RpcLedger::with_request_timeout(url, "confirmed", Duration::from_millis(100)).unwrap();
        let started = std::time::Instant::now();
        let err = ledger.balance(&Address::new([1; 32])).await.unwrap_err();
        assert!(matches!(err, LedgerError::Request(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fee_and_rent() {
        let (url, calls) = mock_rpc(HashMap::from([
            (
                "getLatestBlockhash",
                json!({"context": {"slot": 1}, "value": {
                    "blockhash": Address::new([5; 32]).to_string(),
                    "lastValidBlockHeight": 100
                }}),
            ),
            ("getFeeForMessage", json!({"context": {"slot": 1}, "value": 5000})),
            ("getMinimumBalanceForRentExemption", json!(890_880)),
        ]))
        .await;

        let ledger = RpcLedger::new(url, "confirmed").unwrap();
        assert_eq!(ledger.fee_per_signature().await.unwrap(), 5000);
        assert_eq!(
            ledger.minimum_balance_for_rent_exemption(0).await.unwrap(),
            890_880
        );

        let calls = calls.lock().unwrap();
        let methods: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(
            methods,
            vec![
                "getLatestBlockhash",
                "getFeeForMessage",
                "getMinimumBalanceForRentExemption"
            ]
        );
    }

    #[tokio::test]
    async fn test_send_and_confirm_submits_signed_transaction() {
        let payer = Keypair::generate();
        let blockhash = Address::new([5; 32]);
        let mut tx = Transaction::new(payer.address());
        tx.add(crate::domain::entities::Instruction {
            program_id: Address::new([6; 32]),
            accounts: vec![],
            data: vec![1],
        });
        let expected = tx.sign(blockhash, &[&payer]).unwrap();

        let (url, calls) = mock_rpc(HashMap::from([
            (
                "getLatestBlockhash",
                json!({"context": {"slot": 1}, "value": {
                    "blockhash": blockhash.to_string(),
                    "lastValidBlockHeight": 100
                }}),
            ),
            (
                "sendTransaction",
                json!(expected.id().unwrap().to_string()),
            ),
            (
                "getSignatureStatuses",
                json!({"context": {"slot": 2}, "value": [
                    {"slot": 2, "confirmations": 1, "err": null, "confirmationStatus": "confirmed"}
                ]}),
            ),
        ]))
        .await;

        let ledger = RpcLedger::new(url, "confirmed").unwrap();
        let signature = ledger.send_and_confirm(&tx, &[&payer]).await.unwrap();
        assert_eq!(Some(signature), expected.id());

        let calls = calls.lock().unwrap();
        let (_, params) = calls
            .iter()
            .find(|(method, _)| method == "sendTransaction")
            .unwrap();
        let wire = STANDARD.decode(params[0].as_str().unwrap()).unwrap();
        assert_eq!(wire, expected.serialize());
    }

    #[tokio::test]
    async fn test_failed_transaction_status() {
        let payer = Keypair::generate();
        let (url, _) = mock_rpc(HashMap::from([
            (
                "getLatestBlockhash",
                json!({"context": {"slot": 1}, "value": {
                    "blockhash": Address::new([5; 32]).to_string(),
                    "lastValidBlockHeight": 100
                }}),
            ),
            (
                "sendTransaction",
                json!(Signature::new([7; 64]).to_string()),
            ),
            (
                "getSignatureStatuses",
                json!({"context": {"slot": 2}, "value": [
                    {"slot": 2, "err": {"InstructionError": [1, "Custom"]}, "confirmationStatus": "processed"}
                ]}),
            ),
        ]))
        .await;

        let ledger = RpcLedger::new(url, "confirmed").unwrap();
        let err = ledger
            .send_and_confirm(&Transaction::new(payer.address()), &[&payer])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransactionFailed(_)));
    }

    #[test]
    fn test_commitment_rank() {
        assert!(commitment_rank("finalized") > commitment_rank("confirmed"));
        assert!(commitment_rank("confirmed") > commitment_rank("processed"));
    }
}
