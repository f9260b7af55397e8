//! Ethereum JSON-RPC client
//!
//! Transactions are signed locally and broadcast raw. The last signed
//! transaction per nonce is kept so that a resubmission after a timeout
//! rebroadcasts the same bytes instead of creating a competing transaction.

use super::signer::{LegacyTransaction, LocalSigner, SignedTransaction};
use super::{ChainClient, Receipt, TransactionRequest};
use crate::abi::decode_revert;
use crate::error::ChainError;
use crate::types::{decode_hex, encode_hex, parse_quantity, Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Headroom applied on top of `eth_estimateGas`, in percent
const GAS_ESTIMATE_MARGIN: u64 = 120;

/// Node messages meaning "this exact transaction was already accepted"
const ALREADY_SUBMITTED: &[&str] = &["already known", "known transaction", "nonce too low"];

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: Option<Value>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcError {
    fn into_chain_error(self) -> ChainError {
        if let Some(Value::String(data)) = &self.data {
            if let Ok(bytes) = decode_hex(data) {
                if !bytes.is_empty() {
                    return ChainError::Reverted {
                        reason: decode_revert(&bytes),
                    };
                }
            }
        }
        if self.message.to_lowercase().contains("revert") {
            let reason = self
                .message
                .trim_start_matches("execution reverted")
                .trim_start_matches(':')
                .trim();
            return ChainError::Reverted {
                reason: if reason.is_empty() {
                    "execution reverted without a reason".to_string()
                } else {
                    reason.to_string()
                },
            };
        }
        ChainError::Rpc {
            code: self.code,
            message: self.message,
        }
    }
}

/// Receipt as returned by `eth_getTransactionReceipt`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: TxHash,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
    block_number: String,
    gas_used: String,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<Receipt, ChainError> {
        let status = match self.status.as_deref() {
            Some(s) => quantity_u64(s)? == 1,
            // Pre-Byzantium receipts carry no status
            None => true,
        };
        Ok(Receipt {
            transaction_hash: self.transaction_hash,
            status,
            contract_address: self.contract_address,
            block_number: quantity_u64(&self.block_number)?,
            gas_used: quantity_u64(&self.gas_used)?,
        })
    }
}

fn quantity(value: &str) -> Result<U256, ChainError> {
    parse_quantity(value).map_err(ChainError::Transport)
}

fn quantity_u64(value: &str) -> Result<u64, ChainError> {
    let q = quantity(value)?;
    if q > U256::from(u64::MAX) {
        return Err(ChainError::Transport(format!("quantity {} overflows u64", value)));
    }
    Ok(q.as_u64())
}

fn expect_str(value: &Value, method: &str) -> Result<String, ChainError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ChainError::Transport(format!("{} returned a non-string result", method)))
}

fn format_quantity(value: U256) -> String {
    format!("{:#x}", value)
}

/// JSON-RPC client bound to one endpoint and one sender key
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    request_id: AtomicU64,
    signer: LocalSigner,
    chain_id: u64,
    gas_cap: u64,
    signed: Mutex<HashMap<u64, (TransactionRequest, SignedTransaction)>>,
}

impl JsonRpcClient {
    pub fn new(
        url: &str,
        signer: LocalSigner,
        chain_id: u64,
        gas_cap: u64,
        request_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
            request_id: AtomicU64::new(1),
            signer,
            chain_id,
            gas_cap,
            signed: Mutex::new(HashMap::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw JSON-RPC call; a `null` result is returned as `Value::Null`
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        trace!(id, method, "rpc request");

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ChainError::Transport(format!("{} returned HTTP {}", method, status)));
        }
        if !status.is_success() {
            return Err(ChainError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("{} returned HTTP {}", method, status),
            });
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(format!("malformed {} response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(error.into_chain_error());
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    pub async fn gas_price(&self) -> Result<U256, ChainError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        quantity(&expect_str(&result, "eth_gasPrice")?)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ChainError> {
        let mut tx = json!({
            "from": self.signer.address(),
            "data": encode_hex(&request.data),
            "value": format_quantity(request.value),
        });
        if let Some(to) = request.to {
            tx["to"] = json!(to);
        }
        let result = self.request("eth_estimateGas", json!([tx])).await?;
        let estimate = quantity_u64(&expect_str(&result, "eth_estimateGas")?)?;
        Ok((estimate.saturating_mul(GAS_ESTIMATE_MARGIN) / 100).min(self.gas_cap))
    }

    async fn sign(
        &self,
        request: &TransactionRequest,
        nonce: u64,
    ) -> Result<SignedTransaction, ChainError> {
        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => self.estimate_gas(request).await?,
        };
        let tx = LegacyTransaction {
            nonce,
            gas_price: self.gas_price().await?,
            gas_limit,
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            chain_id: self.chain_id,
        };
        self.signer
            .sign_legacy(&tx)
            .map_err(|message| ChainError::Rpc { code: 0, message })
    }

    fn cached(&self, request: &TransactionRequest, nonce: u64) -> Option<SignedTransaction> {
        self.signed
            .lock()
            .get(&nonce)
            .filter(|(cached, _)| cached == request)
            .map(|(_, signed)| signed.clone())
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let result = self.request("eth_chainId", json!([])).await?;
        quantity_u64(&expect_str(&result, "eth_chainId")?)
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, ChainError> {
        let result = self
            .request("eth_getTransactionCount", json!([account, "pending"]))
            .await?;
        quantity_u64(&expect_str(&result, "eth_getTransactionCount")?)
    }

    async fn send_transaction(
        &self,
        request: &TransactionRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        let (signed, resubmission) = match self.cached(request, nonce) {
            Some(signed) => (signed, true),
            None => {
                let signed = self.sign(request, nonce).await?;
                self.signed
                    .lock()
                    .insert(nonce, (request.clone(), signed.clone()));
                (signed, false)
            }
        };
        debug!(nonce, hash = %signed.hash, resubmission, "broadcasting transaction");

        match self
            .request("eth_sendRawTransaction", json!([encode_hex(&signed.raw)]))
            .await
        {
            Ok(_) => Ok(signed.hash),
            Err(ChainError::Rpc { message, .. })
                if resubmission
                    && ALREADY_SUBMITTED
                        .iter()
                        .any(|m| message.to_lowercase().contains(m)) =>
            {
                debug!(hash = %signed.hash, "transaction already known to the node");
                Ok(signed.hash)
            }
            Err(e) => Err(e),
        }
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(result)
            .map_err(|e| ChainError::Transport(format!("malformed receipt: {}", e)))?;
        raw.into_receipt().map(Some)
    }

    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let params = json!([
            { "from": self.signer.address(), "to": to, "data": encode_hex(data) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        decode_hex(&expect_str(&result, "eth_call")?).map_err(ChainError::Transport)
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        let result = self
            .request("eth_getBalance", json!([account, "latest"]))
            .await?;
        quantity(&expect_str(&result, "eth_getBalance")?)
    }

    async fn revert_reason(
        &self,
        request: &TransactionRequest,
        block_number: u64,
    ) -> Result<Option<String>, ChainError> {
        let mut tx = json!({
            "from": self.signer.address(),
            "data": encode_hex(&request.data),
            "value": format_quantity(request.value),
        });
        if let Some(to) = request.to {
            tx["to"] = json!(to);
        }
        if let Some(gas) = request.gas_limit {
            tx["gas"] = json!(format_quantity(U256::from(gas)));
        }
        let block = format_quantity(U256::from(block_number));
        match self.request("eth_call", json!([tx, block])).await {
            Ok(_) => Ok(None),
            Err(ChainError::Reverted { reason }) => Ok(Some(reason)),
            Err(e) => Err(e),
        }
    }
}
