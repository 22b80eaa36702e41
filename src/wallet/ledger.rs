//! Ledger collaborator
//!
//! Balance reads, anti-replay references, broadcast and funding against
//! the external ledger.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Recent blockhash plus the last block height at which it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Client for the external ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance of an address in lamports
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    /// Fresh anti-replay reference for a new transaction
    async fn get_recent_reference(&self) -> Result<ChainReference>;

    /// Submit a signed transaction and wait for confirmation
    async fn broadcast_and_confirm(&self, transaction: &Transaction) -> Result<Signature>;

    /// Ask the funding source to credit an address
    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature>;
}

/// Solana JSON-RPC ledger client
///
/// Read calls are retried with exponential backoff. Broadcasts are never
/// retried: a resend after an ambiguous failure could double-spend.
pub struct RpcLedgerClient {
    rpc_client: RpcClient,
    max_retries: u32,
    retry_base_delay: Duration,
    confirm_timeout: Duration,
}

impl RpcLedgerClient {
    /// Create a client from RPC settings
    pub fn new(config: &RpcConfig) -> Self {
        let rpc_client = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
            CommitmentConfig::confirmed(),
        );

        info!("Ledger client initialized for {}", config.endpoint);

        Self {
            rpc_client,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        }
    }

    fn read_backoff(&self) -> ExponentialBackoff {
        let attempts = self.max_retries.max(1);
        ExponentialBackoff {
            initial_interval: self.retry_base_delay,
            max_interval: self.retry_base_delay * 4,
            max_elapsed_time: Some(self.retry_base_delay * 4 * attempts),
            ..Default::default()
        }
    }
}

/// Classify an error for the backoff loop
fn classify(e: Error) -> backoff::Error<Error> {
    if e.is_retryable() {
        warn!("Retryable ledger error: {}", e);
        backoff::Error::transient(e)
    } else {
        backoff::Error::permanent(e)
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let rpc = &self.rpc_client;
        retry(self.read_backoff(), || async move {
            rpc.get_balance(address)
                .await
                .map_err(|e| classify(Error::Rpc(format!("Failed to get balance: {}", e))))
        })
        .await
    }

    async fn get_recent_reference(&self) -> Result<ChainReference> {
        let rpc = &self.rpc_client;
        let (blockhash, last_valid_block_height) = retry(self.read_backoff(), || async move {
            rpc.get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
                .await
                .map_err(|e| classify(Error::Rpc(format!("Failed to get blockhash: {}", e))))
        })
        .await?;

        debug!(%blockhash, last_valid_block_height, "Fetched chain reference");

        Ok(ChainReference {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn broadcast_and_confirm(&self, transaction: &Transaction) -> Result<Signature> {
        let send = self.rpc_client.send_and_confirm_transaction(transaction);

        match tokio::time::timeout(self.confirm_timeout, send).await {
            Ok(Ok(signature)) => {
                info!(%signature, "Transaction confirmed");
                Ok(signature)
            }
            Ok(Err(e)) => Err(Error::TransactionSend(format!("Transfer failed: {}", e))),
            Err(_) => Err(Error::RpcTimeout(self.confirm_timeout.as_millis() as u64)),
        }
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        let signature = self
            .rpc_client
            .request_airdrop(address, lamports)
            .await
            .map_err(|e| Error::Funding(format!("Airdrop request failed: {}", e)))?;

        let confirm = self.rpc_client.poll_for_signature(&signature);
        match tokio::time::timeout(self.confirm_timeout, confirm).await {
            Ok(Ok(())) => {
                info!(%address, lamports, %signature, "Airdrop confirmed");
                Ok(signature)
            }
            Ok(Err(e)) => Err(Error::Funding(format!("Airdrop not confirmed: {}", e))),
            Err(_) => Err(Error::RpcTimeout(self.confirm_timeout.as_millis() as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_retryable() {
        assert!(matches!(
            classify(Error::Rpc("503".into())),
            backoff::Error::Transient { .. }
        ));
        assert!(matches!(
            classify(Error::TransactionSend("rejected".into())),
            backoff::Error::Permanent(_)
        ));
    }

    #[test]
    fn test_read_backoff_bounds() {
        let client = RpcLedgerClient::new(&RpcConfig {
            endpoint: "http://127.0.0.1:8899".to_string(),
            timeout_ms: 1000,
            confirm_timeout_ms: 5000,
            max_retries: 3,
            retry_base_delay_ms: 100,
        });

        let backoff = client.read_backoff();
        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_millis(400));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_millis(1200)));
    }
}
