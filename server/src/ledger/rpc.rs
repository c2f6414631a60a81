//! JSON-RPC 2.0 client for a ledger gateway.
//!
//! The gateway fronts the chain node and exposes three methods:
//!
//! - `ledger_submit([entry])` → `{ "txRef": "…" }`
//! - `ledger_receipt([txRef])` → `{ "confirmed": bool, "timestamp": i64 }` or `null` while pending
//! - `ledger_lookup([fileId])` → latest [`LedgerEntry`] or `null`
//!
//! `anchor` submits, then polls `ledger_receipt` until the transaction is
//! confirmed. It has no deadline of its own; the pipeline bounds the wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{AnchorRequest, AnchorSigner, Confirmation, LedgerAnchor, LedgerEntry, LedgerError};

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams<'a> {
    #[serde(flatten)]
    request: &'a AnchorRequest,
    owner: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResult {
    tx_ref: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResult {
    confirmed: bool,
    #[serde(default)]
    timestamp: Option<i64>,
}

pub struct RpcLedger {
    client: Client,
    url: Url,
    api_token: Option<String>,
    signer: AnchorSigner,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(
        rpc_url: &str,
        api_token: Option<String>,
        signer: AnchorSigner,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| LedgerError::Unavailable(format!("invalid ledger RPC URL: {}", e)))?;
        // bounds each call; `anchor` as a whole is bounded by the pipeline
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(format!("ledger RPC client: {}", e)))?;
        Ok(Self {
            client,
            url,
            api_token: api_token.filter(|t| !t.is_empty()),
            signer,
            poll_interval,
            next_id: AtomicU64::new(1),
        })
    }

    /// One JSON-RPC round trip. A `null` result comes back as `None`.
    async fn call<P, T>(&self, method: &str, params: P) -> Result<Option<T>, LedgerError>
    where
        P: Serialize + Send,
        T: DeserializeOwned + Send,
    {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut req = self.client.post(self.url.clone()).json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("{}: {}", method, e)))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "{}: gateway answered {}",
                method,
                resp.status()
            )));
        }

        let decoded: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(format!("{}: {}", method, e)))?;

        if let Some(err) = decoded.error {
            return Err(LedgerError::Unavailable(format!(
                "{} failed ({}): {}",
                method, err.code, err.message
            )));
        }
        Ok(decoded.result)
    }
}

#[async_trait]
impl LedgerAnchor for RpcLedger {
    async fn anchor(&self, request: AnchorRequest) -> Result<Confirmation, LedgerError> {
        let params = SubmitParams {
            owner: self.signer.owner(),
            signature: self.signer.sign(&request),
            request: &request,
        };
        let submitted: SubmitResult = self
            .call("ledger_submit", [params])
            .await?
            .ok_or_else(|| LedgerError::Malformed("ledger_submit returned no txRef".to_string()))?;

        tracing::debug!("Submitted anchor for {} as {}", request.file_id, submitted.tx_ref);

        loop {
            let receipt: Option<ReceiptResult> =
                self.call("ledger_receipt", [&submitted.tx_ref]).await?;
            match receipt {
                Some(r) if r.confirmed => {
                    return Ok(Confirmation {
                        timestamp: r.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
                        tx_ref: submitted.tx_ref,
                    });
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn lookup(&self, file_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        self.call("ledger_lookup", [file_id]).await
    }
}
