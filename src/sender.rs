//! Serialized transaction submission for the single sending account
//!
//! Every state-changing action goes through one `SenderQueue`, which holds
//! the nonce lock for the whole send + confirm cycle. Two actions can never
//! race for the same nonce, and a retried action reuses the nonce it was
//! first given.

use crate::chain::{ChainClient, Receipt, TransactionRequest};
use crate::error::{ChainError, OrchestratorError, OrchestratorResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{Address, TxHash};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct SenderQueue {
    client: Arc<dyn ChainClient>,
    next_nonce: Mutex<Option<u64>>,
    poll_interval: Duration,
}

impl SenderQueue {
    pub fn new(client: Arc<dyn ChainClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            next_nonce: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn sender(&self) -> Address {
        self.client.sender()
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// Submit `request` and wait for its receipt.
    ///
    /// Transport failures and confirmation timeouts are retried with the same
    /// nonce; reverts and node rejections are returned immediately.
    pub async fn submit(
        &self,
        subject: &str,
        request: &TransactionRequest,
        policy: &RetryPolicy,
        timeout: Duration,
    ) -> OrchestratorResult<Receipt> {
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => {
                let sender = self.client.sender();
                with_retry(policy, subject, |_| self.client.transaction_count(sender))
                    .await
                    .map_err(|f| OrchestratorError::from_chain(subject, f.error, f.attempts))?
            }
        };

        let result = with_retry(policy, subject, |attempt| async move {
            let hash = self.client.send_transaction(request, nonce).await?;
            debug!(subject, nonce, attempt, %hash, "transaction submitted");
            self.await_receipt(&hash, timeout).await
        })
        .await;

        match result {
            Ok(receipt) => {
                *next_nonce = Some(nonce + 1);
                if !receipt.status {
                    return Err(OrchestratorError::Revert {
                        subject: subject.to_string(),
                        reason: self.mined_revert_reason(subject, request, &receipt).await,
                    });
                }
                info!(
                    subject,
                    hash = %receipt.transaction_hash,
                    block = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "transaction confirmed"
                );
                Ok(receipt)
            }
            Err(failure) => {
                // A revert on submission leaves the nonce unused. Anything
                // else leaves the account state unknown; re-read it next time.
                if !matches!(failure.error, ChainError::Reverted { .. }) {
                    warn!(subject, nonce, "nonce state unknown after failure, will refresh");
                    *next_nonce = None;
                } else {
                    *next_nonce = Some(nonce);
                }
                Err(OrchestratorError::from_chain(
                    subject,
                    failure.error,
                    failure.attempts,
                ))
            }
        }
    }

    /// Read-only call, retried on transient failures
    pub async fn read(
        &self,
        subject: &str,
        to: Address,
        data: &[u8],
        policy: &RetryPolicy,
    ) -> OrchestratorResult<Vec<u8>> {
        with_retry(policy, subject, |_| self.client.call(to, data))
            .await
            .map_err(|f| OrchestratorError::from_chain(subject, f.error, f.attempts))
    }

    /// Reason a mined transaction failed, recovered by replaying it
    async fn mined_revert_reason(
        &self,
        subject: &str,
        request: &TransactionRequest,
        receipt: &Receipt,
    ) -> String {
        match self
            .client
            .revert_reason(request, receipt.block_number)
            .await
        {
            Ok(Some(reason)) => reason,
            Ok(None) => "transaction reverted on-chain (status 0)".to_string(),
            Err(e) => {
                warn!(subject, hash = %receipt.transaction_hash, "replay of failed transaction failed: {}", e);
                "transaction reverted on-chain (status 0)".to_string()
            }
        }
    }

    async fn await_receipt(&self, hash: &TxHash, timeout: Duration) -> Result<Receipt, ChainError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.client.transaction_receipt(hash).await? {
                    return Ok(receipt);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;

    fn queue(chain: &Arc<MockChain>) -> SenderQueue {
        SenderQueue::new(chain.clone(), Duration::from_millis(10))
    }

    fn mock() -> Arc<MockChain> {
        Arc::new(MockChain::new(31337, Address::from_slice(&[1u8; 20]).unwrap()))
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 10,
            max_backoff_ms: 10,
            multiplier: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonces_are_sequential() {
        let chain = mock();
        let queue = queue(&chain);
        for code in [0x60u8, 0x61, 0x62] {
            queue
                .submit(
                    "unit",
                    &TransactionRequest::deploy(vec![code]),
                    &fast_policy(1),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
        }
        let nonces: Vec<u64> = chain.sent().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_are_retried() {
        let chain = mock();
        chain.fail_sends(2);
        let receipt = queue(&chain)
            .submit(
                "A",
                &TransactionRequest::deploy(vec![0x60]),
                &fast_policy(3),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(receipt.contract_address.is_some());
        assert_eq!(chain.send_attempts(), 3);
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_network_errors() {
        let chain = mock();
        chain.fail_sends(10);
        let err = queue(&chain)
            .submit(
                "A",
                &TransactionRequest::deploy(vec![0x60]),
                &fast_policy(3),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NetworkError");
        assert_eq!(err.subject(), Some("A"));
        assert_eq!(chain.send_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_withheld_receipt_times_out() {
        let chain = mock();
        chain.withhold_receipts(true);
        let err = queue(&chain)
            .submit(
                "A",
                &TransactionRequest::deploy(vec![0x60]),
                &fast_policy(2),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
        // The resubmission rebroadcasts the same transaction
        assert_eq!(chain.send_attempts(), 2);
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_keeps_nonce() {
        let chain = mock();
        chain.revert_when(|req| (req.data == vec![0xfe]).then(|| "bad".to_string()));
        let queue = queue(&chain);

        let err = queue
            .submit(
                "B",
                &TransactionRequest::deploy(vec![0xfe]),
                &fast_policy(5),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RevertError");
        assert_eq!(chain.send_attempts(), 1);

        queue
            .submit(
                "C",
                &TransactionRequest::deploy(vec![0x60]),
                &fast_policy(1),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(chain.sent()[0].nonce, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mined_failure_carries_replayed_reason() {
        let chain = mock();
        chain.fail_mined_when(|req| {
            (req.gas_limit == Some(500_000)).then(|| "Insufficient stake".to_string())
        });
        let queue = queue(&chain);
        let target = Address::from_slice(&[7u8; 20]).unwrap();

        let err = queue
            .submit(
                "register-participant",
                &TransactionRequest::call(target, vec![0x12, 0x34, 0x56, 0x78])
                    .with_gas_limit(Some(500_000)),
                &fast_policy(3),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RevertError");
        assert!(err.to_string().contains("Insufficient stake"));
        // Mined, so the nonce is spent and the transaction is not resent
        assert_eq!(chain.send_attempts(), 1);

        queue
            .submit(
                "next",
                &TransactionRequest::deploy(vec![0x60]),
                &fast_policy(1),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let nonces: Vec<u64> = chain.sent().iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);
    }
}
