use solana_client::{
    client_error::ClientError, nonblocking::rpc_client::RpcClient,
    rpc_request::MAX_MULTIPLE_ACCOUNTS,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::TransactionStatus;
use std::{sync::Arc, time::Duration};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};

use crate::domain::{
    errors::ClusterError,
    models::{LiveAccount, Net, NetStatus},
};

use super::cluster_client::ClusterClient;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A client for one Solana cluster, backed by the nonblocking RPC client.
#[derive(Clone)]
pub struct SolanaClient {
    net: Net,
    rpc_client: Arc<RpcClient>,
    request_timeout: Duration,
    confirm_timeout: Duration,
}

impl SolanaClient {
    /// Creates a new `SolanaClient` instance from the given RPC URL.
    ///
    /// # Arguments
    ///
    /// * `net` - The cluster target the URL belongs to.
    /// * `rpc_url` - The URL of the Solana RPC endpoint.
    /// * `request_timeout` - Upper bound for a single RPC request.
    /// * `confirm_timeout` - Upper bound for waiting on transaction finality.
    pub fn from_url(
        net: Net,
        rpc_url: &str,
        request_timeout: Duration,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            net,
            rpc_client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                rpc_url.to_string(),
                request_timeout,
                CommitmentConfig::confirmed(),
            )),
            request_timeout,
            confirm_timeout,
        }
    }

    pub fn for_net(net: Net, request_timeout: Duration, confirm_timeout: Duration) -> Self {
        Self::from_url(net, net.rpc_url(), request_timeout, confirm_timeout)
    }

    fn network_error(&self, error: ClientError) -> ClusterError {
        ClusterError::Network {
            endpoint: self.rpc_client.url(),
            reason: error.to_string(),
        }
    }

    /// Polls the signature status until the transaction is finalized, fails, or
    /// the confirmation timeout runs out.
    async fn wait_for_finality(&self, signature: &Signature) -> Result<(), ClusterError> {
        let poll = async {
            loop {
                let statuses = self
                    .rpc_client
                    .get_signature_statuses(&[*signature])
                    .await
                    .map_err(|e| self.network_error(e))?;
                let status: Option<TransactionStatus> = statuses.value.into_iter().flatten().next();
                if let Some(status) = status {
                    if let Some(err) = status.err {
                        return Err(ClusterError::Submission(err.to_string()));
                    }
                    if status.satisfies_commitment(CommitmentConfig::finalized()) {
                        return Ok(());
                    }
                }
                tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(self.confirm_timeout, poll)
            .await
            .map_err(|_| ClusterError::ConfirmationTimeout {
                signature: *signature,
                timeout: self.confirm_timeout,
            })?
    }
}

#[async_trait::async_trait]
impl ClusterClient for SolanaClient {
    fn net(&self) -> Net {
        self.net
    }

    async fn probe(&self) -> NetStatus {
        match tokio::time::timeout(self.request_timeout, self.rpc_client.get_epoch_info()).await {
            Ok(Ok(_)) => NetStatus::Running,
            Ok(Err(e)) => {
                tracing::debug!("Cluster {} unavailable: {}", self.net, e);
                NetStatus::Unavailable
            }
            Err(_) => {
                tracing::debug!("Cluster {} probe timed out", self.net);
                NetStatus::Unavailable
            }
        }
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<LiveAccount>, ClusterError> {
        let retry_strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);

        let response = Retry::spawn(retry_strategy, || {
            self.rpc_client
                .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
        })
        .await
        .map_err(|e| ClusterError::AccountFetch {
            pubkey: *pubkey,
            reason: e.to_string(),
        })?;
        Ok(response.value.map(LiveAccount::from))
    }

    async fn get_accounts_batch(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<LiveAccount>>, ClusterError> {
        let mut accounts = Vec::with_capacity(pubkeys.len());

        // the RPC caps getMultipleAccounts; chunks are fetched in input order
        for chunk in pubkeys.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let retry_strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);

            let result = Retry::spawn(retry_strategy, || {
                self.rpc_client.get_multiple_accounts(chunk)
            })
            .await
            .map_err(|e| self.network_error(e))?;

            if result.len() != chunk.len() {
                return Err(ClusterError::MalformedResponse(format!(
                    "requested {} accounts, got {}",
                    chunk.len(),
                    result.len()
                )));
            }
            accounts.extend(result.into_iter().map(|a| a.map(LiveAccount::from)));
        }

        Ok(accounts)
    }

    async fn latest_blockhash(&self) -> Result<Hash, ClusterError> {
        let retry_strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);

        Retry::spawn(retry_strategy, || self.rpc_client.get_latest_blockhash())
            .await
            .map_err(|e| self.network_error(e))
    }

    async fn submit_and_confirm(&self, transaction: Transaction) -> Result<Signature, ClusterError> {
        let signature = self
            .rpc_client
            .send_transaction(&transaction)
            .await
            .map_err(|e| ClusterError::Submission(e.to_string()))?;
        tracing::info!("Submitted transaction {} to {}", signature, self.net);

        self.wait_for_finality(&signature).await?;
        Ok(signature)
    }

    async fn request_airdrop(
        &self,
        pubkey: &Pubkey,
        lamports: u64,
    ) -> Result<Signature, ClusterError> {
        let signature = self
            .rpc_client
            .request_airdrop(pubkey, lamports)
            .await
            .map_err(|e| ClusterError::Submission(e.to_string()))?;
        tracing::info!("Requested airdrop of {} lamports to {}", lamports, pubkey);

        self.wait_for_finality(&signature).await?;
        Ok(signature)
    }
}
