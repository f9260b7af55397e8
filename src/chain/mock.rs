//! In-memory chain used for dry runs and tests
//!
//! Behaves like a single-sender node with instant mining: strict nonce
//! ordering, CREATE addresses, value balance, idempotent resubmission.
//! Contract behaviour is scripted per function selector, and failures
//! (transport errors, reverts, withheld receipts) can be injected.

use super::signer::create_address;
use super::{ChainClient, Receipt, TransactionRequest};
use crate::abi::selector;
use crate::error::ChainError;
use crate::types::{keccak256, Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use rlp::RlpStream;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// A call or transaction as seen by a scripted handler
#[derive(Clone, Debug)]
pub struct Invocation {
    pub from: Address,
    pub to: Address,
    /// Calldata without the selector
    pub args: Vec<u8>,
    pub value: U256,
}

/// Free-form contract state shared by all handlers
#[derive(Debug, Default)]
pub struct MockState {
    values: HashMap<String, Value>,
}

impl MockState {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn flag(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.values.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn increment(&mut self, key: &str) -> u64 {
        let next = self.counter(key) + 1;
        self.set(key, next);
        next
    }
}

/// Transaction accepted by the mock
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    pub nonce: u64,
    pub hash: TxHash,
    pub request: TransactionRequest,
}

impl SentTransaction {
    /// Selector of the called function, `None` for deployments
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.request.is_deployment() || self.request.data.len() < 4 {
            return None;
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&self.request.data[..4]);
        Some(sel)
    }

    pub fn calls(&self, signature: &str) -> bool {
        self.selector() == Some(selector(signature))
    }
}

type CallHandler = Box<dyn Fn(&MockState, &Invocation) -> Vec<u8> + Send + Sync>;
type TransactHandler = Box<dyn Fn(&mut MockState, &Invocation) -> Result<(), String> + Send + Sync>;
type RevertRule = Box<dyn Fn(&TransactionRequest) -> Option<String> + Send + Sync>;
type RequestFilter = Box<dyn Fn(&TransactionRequest) -> bool + Send + Sync>;

struct InjectedFailure {
    remaining: u32,
    matches: RequestFilter,
}

struct Inner {
    balance: U256,
    next_nonce: u64,
    sent: Vec<SentTransaction>,
    receipts: HashMap<TxHash, Receipt>,
    send_attempts: u32,
    failures: Vec<InjectedFailure>,
    withhold_receipts: bool,
    call_handlers: HashMap<[u8; 4], CallHandler>,
    transact_handlers: HashMap<[u8; 4], TransactHandler>,
    revert_rules: Vec<RevertRule>,
    mined_failure_rules: Vec<RevertRule>,
    mined_failures: Vec<(TransactionRequest, String)>,
    state: MockState,
}

/// Single-sender in-memory chain
pub struct MockChain {
    chain_id: u64,
    sender: Address,
    inner: Mutex<Inner>,
}

impl MockChain {
    pub fn new(chain_id: u64, sender: Address) -> Self {
        Self {
            chain_id,
            sender,
            inner: Mutex::new(Inner {
                balance: U256::exp10(18) * 1_000,
                next_nonce: 0,
                sent: Vec::new(),
                receipts: HashMap::new(),
                send_attempts: 0,
                failures: Vec::new(),
                withhold_receipts: false,
                call_handlers: HashMap::new(),
                transact_handlers: HashMap::new(),
                revert_rules: Vec::new(),
                mined_failure_rules: Vec::new(),
                mined_failures: Vec::new(),
                state: MockState::default(),
            }),
        }
    }

    // ==================== Scripting ====================

    /// Answer `eth_call`s to `signature` with the handler's return data
    pub fn on_call<F>(&self, signature: &str, handler: F)
    where
        F: Fn(&MockState, &Invocation) -> Vec<u8> + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .call_handlers
            .insert(selector(signature), Box::new(handler));
    }

    /// Execute transactions calling `signature`; `Err(reason)` reverts
    pub fn on_transact<F>(&self, signature: &str, handler: F)
    where
        F: Fn(&mut MockState, &Invocation) -> Result<(), String> + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .transact_handlers
            .insert(selector(signature), Box::new(handler));
    }

    /// Revert any transaction for which `rule` yields a reason
    pub fn revert_when<F>(&self, rule: F)
    where
        F: Fn(&TransactionRequest) -> Option<String> + Send + Sync + 'static,
    {
        self.inner.lock().revert_rules.push(Box::new(rule));
    }

    /// Accept but mine with status 0 any transaction for which `rule`
    /// yields a reason; the reason is only visible through a replay
    pub fn fail_mined_when<F>(&self, rule: F)
    where
        F: Fn(&TransactionRequest) -> Option<String> + Send + Sync + 'static,
    {
        self.inner.lock().mined_failure_rules.push(Box::new(rule));
    }

    /// Fail the next `count` sends with a transport error
    pub fn fail_sends(&self, count: u32) {
        self.fail_sends_matching(count, |_| true);
    }

    /// Fail the next `count` sends of matching requests with a transport error
    pub fn fail_sends_matching<F>(&self, count: u32, matches: F)
    where
        F: Fn(&TransactionRequest) -> bool + Send + Sync + 'static,
    {
        self.inner.lock().failures.push(InjectedFailure {
            remaining: count,
            matches: Box::new(matches),
        });
    }

    /// Keep every receipt pending
    pub fn withhold_receipts(&self, withhold: bool) {
        self.inner.lock().withhold_receipts = withhold;
    }

    pub fn set_balance(&self, balance: U256) {
        self.inner.lock().balance = balance;
    }

    /// Run `f` against the scripted contract state
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.inner.lock().state)
    }

    // ==================== Inspection ====================

    /// Transactions accepted so far, in nonce order
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.inner.lock().sent.clone()
    }

    /// Every `send_transaction` call, including failed and repeated ones
    pub fn send_attempts(&self) -> u32 {
        self.inner.lock().send_attempts
    }

    fn transaction_hash(&self, request: &TransactionRequest, nonce: u64) -> TxHash {
        let mut stream = RlpStream::new_list(6);
        stream.append(&self.chain_id);
        stream.append(&self.sender);
        stream.append(&nonce);
        match &request.to {
            Some(to) => stream.append(to),
            None => stream.append_empty_data(),
        };
        stream.append(&request.value);
        stream.append(&request.data);
        TxHash(keccak256(stream.out()))
    }
}

fn split_calldata(data: &[u8]) -> Option<([u8; 4], Vec<u8>)> {
    if data.len() < 4 {
        return None;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    Some((sel, data[4..].to_vec()))
}

#[async_trait]
impl ChainClient for MockChain {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, ChainError> {
        if account != self.sender {
            return Ok(0);
        }
        Ok(self.inner.lock().next_nonce)
    }

    async fn send_transaction(
        &self,
        request: &TransactionRequest,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        let hash = self.transaction_hash(request, nonce);
        let mut inner = self.inner.lock();
        inner.send_attempts += 1;

        if let Some(failure) = inner
            .failures
            .iter_mut()
            .find(|f| f.remaining > 0 && (f.matches)(request))
        {
            failure.remaining -= 1;
            return Err(ChainError::Transport("connection reset by peer".to_string()));
        }

        if nonce < inner.next_nonce {
            let known = inner
                .sent
                .iter()
                .any(|tx| tx.nonce == nonce && tx.request == *request);
            return if known {
                Ok(hash)
            } else {
                Err(ChainError::Rpc {
                    code: -32000,
                    message: format!("nonce too low: next nonce {}, tx nonce {}", inner.next_nonce, nonce),
                })
            };
        }
        if nonce > inner.next_nonce {
            return Err(ChainError::Rpc {
                code: -32000,
                message: format!("nonce too high: next nonce {}, tx nonce {}", inner.next_nonce, nonce),
            });
        }

        if let Some(reason) = inner.revert_rules.iter().find_map(|rule| rule(request)) {
            return Err(ChainError::Reverted { reason });
        }
        if request.value > inner.balance {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }

        let mined_failure = inner
            .mined_failure_rules
            .iter()
            .find_map(|rule| rule(request));
        let status = mined_failure.is_none();
        if let Some(reason) = mined_failure {
            inner.mined_failures.push((request.clone(), reason));
        }

        let contract_address = match request.to {
            _ if !status => None,
            None => Some(create_address(&self.sender, nonce)),
            Some(to) => {
                if let Some((sel, args)) = split_calldata(&request.data) {
                    let invocation = Invocation {
                        from: self.sender,
                        to,
                        args,
                        value: request.value,
                    };
                    let Inner {
                        transact_handlers,
                        state,
                        ..
                    } = &mut *inner;
                    if let Some(handler) = transact_handlers.get(&sel) {
                        handler(state, &invocation)
                            .map_err(|reason| ChainError::Reverted { reason })?;
                    }
                }
                None
            }
        };

        if status {
            inner.balance -= request.value;
        }
        inner.next_nonce += 1;
        let block_number = inner.next_nonce;
        inner.sent.push(SentTransaction {
            nonce,
            hash,
            request: request.clone(),
        });
        inner.receipts.insert(
            hash,
            Receipt {
                transaction_hash: hash,
                status,
                contract_address,
                block_number,
                gas_used: 21_000 + 16 * request.data.len() as u64,
            },
        );
        debug!(nonce, %hash, status, "mock transaction mined");
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Option<Receipt>, ChainError> {
        let inner = self.inner.lock();
        if inner.withhold_receipts {
            return Ok(None);
        }
        Ok(inner.receipts.get(hash).cloned())
    }

    async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let inner = self.inner.lock();
        let Some((sel, args)) = split_calldata(data) else {
            return Err(ChainError::Reverted {
                reason: "execution reverted without a reason".to_string(),
            });
        };
        let invocation = Invocation {
            from: self.sender,
            to,
            args,
            value: U256::zero(),
        };
        match inner.call_handlers.get(&sel) {
            Some(handler) => Ok(handler(&inner.state, &invocation)),
            // Unscripted reads answer zeroed words
            None => Ok(vec![0u8; 256]),
        }
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        if account != self.sender {
            return Ok(U256::zero());
        }
        Ok(self.inner.lock().balance)
    }

    async fn revert_reason(
        &self,
        request: &TransactionRequest,
        _block_number: u64,
    ) -> Result<Option<String>, ChainError> {
        Ok(self
            .inner
            .lock()
            .mined_failures
            .iter()
            .rev()
            .find(|(failed, _)| failed == request)
            .map(|(_, reason)| reason.clone()))
    }
}
