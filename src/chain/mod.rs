//! Chain access
//!
//! The orchestrator talks to the network only through [`ChainClient`]:
//! submit a transaction, poll its receipt, read state. Implementations:
//! - [`rpc::JsonRpcClient`]: Ethereum JSON-RPC over HTTP with local signing
//! - [`mock::MockChain`]: in-memory chain for dry runs and tests

pub mod mock;
pub mod rpc;
pub mod signer;

use crate::error::ChainError;
use crate::types::{Address, TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use mock::MockChain;
pub use rpc::JsonRpcClient;
pub use signer::LocalSigner;

/// A state-changing action before the sender queue assigns its nonce
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    /// `None` creates a contract from `data`
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub value: U256,
    /// Explicit gas limit; estimated when absent
    pub gas_limit: Option<u64>,
}

impl TransactionRequest {
    pub fn deploy(code: Vec<u8>) -> Self {
        Self {
            to: None,
            data: code,
            value: U256::zero(),
            gas_limit: None,
        }
    }

    pub fn call(to: Address, data: Vec<u8>) -> Self {
        Self {
            to: Some(to),
            data,
            value: U256::zero(),
            gas_limit: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }
}

/// Confirmation of a mined transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    /// `false` when execution reverted on-chain
    pub status: bool,
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Opaque transport to the execution environment
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Account every transaction is sent from
    fn sender(&self) -> Address;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Next nonce of `account`, counting pending transactions
    async fn transaction_count(&self, account: Address) -> Result<u64, ChainError>;

    /// Sign and broadcast. Re-sending the same request with the same nonce
    /// must yield the same hash rather than a second transaction.
    async fn send_transaction(
        &self,
        request: &TransactionRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError>;

    /// `None` while the transaction is still pending
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError>;

    /// Read-only call against latest state
    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError>;

    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    /// Re-execute `request` against the state at `block_number` to recover
    /// why it failed on-chain. `None` when the replay does not revert.
    async fn revert_reason(
        &self,
        request: &TransactionRequest,
        block_number: u64,
    ) -> Result<Option<String>, ChainError>;
}
