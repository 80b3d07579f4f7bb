use std::{str::FromStr, sync::Arc};

use super::synchronizer::AccountSynchronizer;
use super::Synchronizer;
use crate::config::WorkbenchConfig;
use crate::domain::errors::WorkbenchError;
use crate::domain::models::{
    checked_sol_to_lamports, Account, AccountsResponse, Net, NetStatus, RegistryEntry,
};
use crate::infrastructure::anchor::{AnchorCli, IdlFetcher};
use crate::infrastructure::cluster_client::{ClusterClient, ClusterClients};
use crate::infrastructure::keystore::Keystore;
use crate::infrastructure::registry::{AccountRegistry, SqliteRegistry};
use crate::infrastructure::solana_client::SolanaClient;
use crate::infrastructure::validator::{DockerSupervisor, ValidatorSupervisor};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[async_trait::async_trait]
pub trait Application {
    async fn cluster_status(&self, net: Net) -> NetStatus;
    async fn run_validator(&self) -> Result<(), WorkbenchError>;
    async fn validator_logs(&self, filter: Option<String>) -> Result<String, WorkbenchError>;
    async fn get_account(&self, net: Net, pubkey: &str) -> Result<Option<Account>, WorkbenchError>;
    async fn accounts(&self, net: Net) -> Result<AccountsResponse, WorkbenchError>;
    async fn update_account_name(
        &self,
        pubkey: &str,
        human_name: &str,
    ) -> Result<usize, WorkbenchError>;
    async fn import_account(&self, net: Net, pubkey: &str) -> Result<Account, WorkbenchError>;
    async fn add_keypair(&self, net: Net) -> Result<AccountsResponse, WorkbenchError>;
    async fn airdrop(&self, net: Net, pubkey: &str, sol: f64) -> Result<Signature, WorkbenchError>;
    async fn fetch_anchor_idl(
        &self,
        program_id: &str,
        net: Option<Net>,
    ) -> Result<serde_json::Value, WorkbenchError>;
}

/// The workbench backend: every component, constructed once at startup.
pub struct App<R, V, I> {
    clients: ClusterClients,
    registry: Arc<R>,
    synchronizer: AccountSynchronizer<R>,
    supervisor: Arc<V>,
    idl_fetcher: Arc<I>,
}

impl App<SqliteRegistry, DockerSupervisor, AnchorCli> {
    /// Opens the persisted state described by `config`.
    pub fn open(config: &WorkbenchConfig) -> Result<Self, WorkbenchError> {
        let (request_timeout, confirm_timeout) = (config.request_timeout, config.confirm_timeout);
        let clients = ClusterClients::connect(|net| {
            Arc::new(SolanaClient::for_net(net, request_timeout, confirm_timeout))
                as Arc<dyn ClusterClient>
        });
        let registry = SqliteRegistry::open(&config.db_path())?;
        let keystore = Keystore::new(config.keys_dir());
        let supervisor = DockerSupervisor::new(&config.docker_path, &config.docker_image);
        let idl_fetcher = AnchorCli::new(&config.anchor_path);
        Ok(Self::from_parts(
            clients,
            registry,
            keystore,
            supervisor,
            idl_fetcher,
        ))
    }
}

impl<R, V, I> App<R, V, I>
where
    R: AccountRegistry + 'static,
    V: ValidatorSupervisor,
    I: IdlFetcher,
{
    pub fn from_parts(
        clients: ClusterClients,
        registry: R,
        keystore: Keystore,
        supervisor: V,
        idl_fetcher: I,
    ) -> Self {
        let registry = Arc::new(registry);
        let synchronizer = AccountSynchronizer::builder()
            .registry(registry.clone())
            .keystore(Arc::new(keystore))
            .build();
        Self {
            clients,
            registry,
            synchronizer,
            supervisor: Arc::new(supervisor),
            idl_fetcher: Arc::new(idl_fetcher),
        }
    }

    fn client(&self, net: Net) -> &dyn ClusterClient {
        self.clients.get(net)
    }
}

fn parse_pubkey(pubkey: &str) -> Result<Pubkey, WorkbenchError> {
    Pubkey::from_str(pubkey.trim()).map_err(|_| WorkbenchError::InvalidPubkey(pubkey.to_string()))
}

#[async_trait::async_trait]
impl<R, V, I> Application for App<R, V, I>
where
    R: AccountRegistry + 'static,
    V: ValidatorSupervisor,
    I: IdlFetcher,
{
    async fn cluster_status(&self, net: Net) -> NetStatus {
        let status = self.client(net).probe().await;
        tracing::info!("Cluster {} is {:?}", net, status);
        status
    }

    async fn run_validator(&self) -> Result<(), WorkbenchError> {
        tracing::info!("Starting local validator ...");
        Ok(self.supervisor.start().await?)
    }

    async fn validator_logs(&self, filter: Option<String>) -> Result<String, WorkbenchError> {
        Ok(self.supervisor.tail_logs(filter).await?)
    }

    async fn get_account(&self, net: Net, pubkey: &str) -> Result<Option<Account>, WorkbenchError> {
        let pubkey = parse_pubkey(pubkey)?;
        tracing::info!("Getting account {} on {}", pubkey, net);
        let live = self.client(net).get_account(&pubkey).await?;
        Ok(live.map(|live| Account::new(pubkey).merge_live(Some(live))))
    }

    async fn accounts(&self, net: Net) -> Result<AccountsResponse, WorkbenchError> {
        tracing::info!("Synchronizing accounts on {} ...", net);
        self.synchronizer.synchronize(self.client(net)).await
    }

    async fn update_account_name(
        &self,
        pubkey: &str,
        human_name: &str,
    ) -> Result<usize, WorkbenchError> {
        let pubkey = parse_pubkey(pubkey)?;
        tracing::info!("Renaming account {} to {}", pubkey, human_name);
        Ok(self.registry.rename(pubkey, human_name.to_string()).await?)
    }

    async fn import_account(&self, net: Net, pubkey: &str) -> Result<Account, WorkbenchError> {
        let pubkey = parse_pubkey(pubkey)?;
        tracing::info!("Importing account {} on {}", pubkey, net);
        let entry = self
            .registry
            .insert(RegistryEntry {
                pubkey,
                net: Some(net),
                human_name: None,
            })
            .await?;
        Ok(Account::from_entry(entry))
    }

    async fn add_keypair(&self, net: Net) -> Result<AccountsResponse, WorkbenchError> {
        tracing::info!("Adding keypair on {} ...", net);
        self.synchronizer.add_keypair(self.client(net)).await
    }

    async fn airdrop(&self, net: Net, pubkey: &str, sol: f64) -> Result<Signature, WorkbenchError> {
        let pubkey = parse_pubkey(pubkey)?;
        let lamports = checked_sol_to_lamports(sol).ok_or(WorkbenchError::InvalidAmount(sol))?;
        tracing::info!("Airdropping {} SOL to {} on {}", sol, pubkey, net);
        Ok(self.client(net).request_airdrop(&pubkey, lamports).await?)
    }

    async fn fetch_anchor_idl(
        &self,
        program_id: &str,
        net: Option<Net>,
    ) -> Result<serde_json::Value, WorkbenchError> {
        let program_id = parse_pubkey(program_id)?;
        Ok(self.idl_fetcher.fetch_idl(&program_id, net).await?)
    }
}
