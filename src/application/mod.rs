use crate::domain::{errors::WorkbenchError, models::AccountsResponse};
use crate::infrastructure::cluster_client::ClusterClient;

pub mod app;
pub mod synchronizer;

/// The `Synchronizer` trait defines how the local account registry is kept in
/// step with a cluster.
///
/// Implementors own the root keypair lifecycle and the bootstrap of the first
/// wallets, so callers only ever see a consistent list of accounts.
///
/// # Examples
///
/// ```no_run
/// use solana_workbench::application::Synchronizer;
/// use solana_workbench::domain::models::AccountsResponse;
/// use solana_workbench::infrastructure::cluster_client::ClusterClient;
///
/// async fn print_accounts(sync: &impl Synchronizer, client: &dyn ClusterClient) {
///     let AccountsResponse { root_key, accounts } = sync.synchronize(client).await.unwrap();
///     println!("{root_key}: {} accounts", accounts.len());
/// }
/// ```
///
/// # Errors
///
/// Any failure aborts the whole call with a single `WorkbenchError`; nothing
/// is persisted for a failed call.
#[async_trait::async_trait]
pub trait Synchronizer {
    /// Refreshes every registered account from the cluster, bootstrapping the
    /// registry with funded wallets if it is empty.
    async fn synchronize(
        &self,
        client: &dyn ClusterClient,
    ) -> Result<AccountsResponse, WorkbenchError>;

    /// Creates, funds and registers one more wallet, then synchronizes.
    async fn add_keypair(
        &self,
        client: &dyn ClusterClient,
    ) -> Result<AccountsResponse, WorkbenchError>;
}
