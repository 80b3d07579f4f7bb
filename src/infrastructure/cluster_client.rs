use crate::domain::{
    errors::ClusterError,
    models::{LiveAccount, Net, NetStatus},
};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::sync::Arc;

/// A trait representing a client for one Solana cluster.
///
/// Implementations never let transport failures escape untyped: every
/// fallible call resolves to a `ClusterError`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// The cluster this client is bound to.
    fn net(&self) -> Net;

    /// Checks whether the cluster answers RPC requests.
    ///
    /// # Returns
    ///
    /// * `NetStatus::Running` if the cluster replied, `NetStatus::Unavailable` on any error or timeout.
    async fn probe(&self) -> NetStatus;

    /// Retrieves the on-chain state of a single account.
    ///
    /// # Arguments
    ///
    /// * `pubkey` - The public key of the account.
    ///
    /// # Returns
    ///
    /// * `Result<Option<LiveAccount>, ClusterError>` - `None` if the account does not exist on chain.
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<LiveAccount>, ClusterError>;

    /// Retrieves the on-chain state of many accounts at once.
    ///
    /// # Arguments
    ///
    /// * `pubkeys` - The public keys to look up.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<Option<LiveAccount>>, ClusterError>` - One entry per input key, in input order.
    async fn get_accounts_batch(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<LiveAccount>>, ClusterError>;

    /// Retrieves a recent blockhash to sign transactions with.
    async fn latest_blockhash(&self) -> Result<Hash, ClusterError>;

    /// Submits a signed transaction and waits until the cluster finalizes it.
    ///
    /// # Arguments
    ///
    /// * `transaction` - A fully signed transaction.
    ///
    /// # Returns
    ///
    /// * `Result<Signature, ClusterError>` - The transaction signature, `ClusterError::ConfirmationTimeout`
    ///   if finality was not reached in time.
    async fn submit_and_confirm(&self, transaction: Transaction) -> Result<Signature, ClusterError>;

    /// Requests a faucet airdrop and waits until the cluster finalizes it.
    ///
    /// # Arguments
    ///
    /// * `pubkey` - The account to fund.
    /// * `lamports` - The amount to request.
    async fn request_airdrop(&self, pubkey: &Pubkey, lamports: u64)
        -> Result<Signature, ClusterError>;
}

/// One client per cluster target.
#[derive(Clone)]
pub struct ClusterClients {
    clients: [Arc<dyn ClusterClient>; 4],
}

impl ClusterClients {
    pub fn connect<F>(connect: F) -> Self
    where
        F: Fn(Net) -> Arc<dyn ClusterClient>,
    {
        Self {
            clients: Net::ALL.map(connect),
        }
    }

    pub fn get(&self, net: Net) -> &dyn ClusterClient {
        self.clients[net.index()].as_ref()
    }
}
