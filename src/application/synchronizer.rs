use super::Synchronizer;
use crate::{
    domain::{
        errors::{ClusterError, WorkbenchError},
        models::{sol_to_lamports, Account, AccountsResponse, RegistryEntry},
    },
    infrastructure::{
        cluster_client::ClusterClient,
        keystore::{Keystore, AIRDROP_SOL},
        registry::AccountRegistry,
    },
};
use solana_sdk::{
    signature::{Keypair, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;

/// Wallets created on an empty registry.
pub const BOOTSTRAP_ACCOUNTS: usize = 5;
/// SOL transferred from the root key to every bootstrap wallet.
pub const BOOTSTRAP_FUNDING_SOL: f64 = 10.0;

/// Reconciles the account registry with the state of a cluster.
#[derive(Clone, TypedBuilder)]
pub struct AccountSynchronizer<R> {
    registry: Arc<R>,
    keystore: Arc<Keystore>,
    #[builder(default)]
    bootstrap_guard: Arc<Mutex<()>>,
}

#[async_trait::async_trait]
impl<R> Synchronizer for AccountSynchronizer<R>
where
    R: AccountRegistry + 'static,
{
    async fn synchronize(
        &self,
        client: &dyn ClusterClient,
    ) -> Result<AccountsResponse, WorkbenchError> {
        let root = self.keystore.ensure_root_keypair(client).await?;

        let entries = self.registry.list().await?;
        if !entries.is_empty() {
            return self.refresh(client, &root, entries).await;
        }

        // re-check under the guard so concurrent first runs bootstrap once
        let _guard = self.bootstrap_guard.lock().await;
        let entries = self.registry.list().await?;
        if !entries.is_empty() {
            return self.refresh(client, &root, entries).await;
        }
        self.bootstrap(client, &root).await
    }

    async fn add_keypair(
        &self,
        client: &dyn ClusterClient,
    ) -> Result<AccountsResponse, WorkbenchError> {
        let root = self.keystore.ensure_root_keypair(client).await?;

        // wallets are numbered under the guard, after any pending bootstrap
        let guard = self.bootstrap_guard.lock().await;
        let mut count = self.registry.list().await?.len();
        if count == 0 {
            count = self.bootstrap(client, &root).await?.accounts.len();
        }

        let wallet = Keypair::new();
        client
            .request_airdrop(&wallet.pubkey(), sol_to_lamports(AIRDROP_SOL))
            .await?;
        self.keystore.store_wallet(&wallet).await?;
        self.registry
            .insert(RegistryEntry {
                pubkey: wallet.pubkey(),
                net: Some(client.net()),
                human_name: Some(format!("Wallet {count}")),
            })
            .await?;
        tracing::info!("Added keypair {} on {}", wallet.pubkey(), client.net());
        drop(guard);

        let entries = self.registry.list().await?;
        self.refresh(client, &root, entries).await
    }
}

impl<R> AccountSynchronizer<R>
where
    R: AccountRegistry,
{
    async fn refresh(
        &self,
        client: &dyn ClusterClient,
        root: &Keypair,
        entries: Vec<RegistryEntry>,
    ) -> Result<AccountsResponse, WorkbenchError> {
        let pubkeys: Vec<_> = entries.iter().map(|e| e.pubkey).collect();
        let live = client.get_accounts_batch(&pubkeys).await?;
        if live.len() != entries.len() {
            return Err(ClusterError::MalformedResponse(format!(
                "requested {} accounts, got {}",
                entries.len(),
                live.len()
            ))
            .into());
        }

        let accounts = entries
            .into_iter()
            .zip(live)
            .map(|(entry, live)| Account::from_entry(entry).merge_live(live))
            .collect();

        Ok(AccountsResponse {
            root_key: root.pubkey(),
            accounts,
        })
    }

    /// Funds `BOOTSTRAP_ACCOUNTS` new wallets from the root key in one
    /// transaction. Wallet keys are stored before submission. Nothing is
    /// registered unless the transfer is finalized; the wallets are then
    /// registered in a single registry transaction.
    async fn bootstrap(
        &self,
        client: &dyn ClusterClient,
        root: &Keypair,
    ) -> Result<AccountsResponse, WorkbenchError> {
        let net = client.net();
        let lamports = sol_to_lamports(BOOTSTRAP_FUNDING_SOL);
        let wallets: Vec<Keypair> = (0..BOOTSTRAP_ACCOUNTS).map(|_| Keypair::new()).collect();
        for wallet in &wallets {
            self.keystore.store_wallet(wallet).await?;
        }

        let instructions: Vec<_> = wallets
            .iter()
            .map(|wallet| {
                tracing::info!("Adding account {}", wallet.pubkey());
                system_instruction::transfer(&root.pubkey(), &wallet.pubkey(), lamports)
            })
            .collect();
        let blockhash = client.latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&root.pubkey()),
            &[root],
            blockhash,
        );
        let signature = client.submit_and_confirm(transaction).await?;
        tracing::info!("Created accounts in transaction {}", signature);

        let entries: Vec<RegistryEntry> = wallets
            .iter()
            .enumerate()
            .map(|(i, wallet)| RegistryEntry {
                pubkey: wallet.pubkey(),
                net: Some(net),
                human_name: Some(format!("Wallet {i}")),
            })
            .collect();
        self.registry.insert_all(entries.clone()).await?;

        Ok(AccountsResponse {
            root_key: root.pubkey(),
            accounts: entries.into_iter().map(Account::from_entry).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::models::{LiveAccount, Net},
        infrastructure::{
            cluster_client::MockClusterClient,
            keystore::ROOT_KEY_FILE_NAME,
            registry::SqliteRegistry,
        },
    };
    use solana_sdk::{
        hash::Hash, instruction::CompiledInstruction, native_token::LAMPORTS_PER_SOL,
        pubkey::Pubkey, signature::Signature, system_instruction::SystemInstruction,
    };
    use std::path::Path;

    struct Fixture {
        dir: tempfile::TempDir,
        root: Keypair,
        registry: Arc<SqliteRegistry>,
        synchronizer: AccountSynchronizer<SqliteRegistry>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = Keypair::new();
        write_root_key(dir.path(), &root);
        let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
        let synchronizer = AccountSynchronizer::builder()
            .registry(registry.clone())
            .keystore(Arc::new(Keystore::new(dir.path())))
            .build();
        Fixture {
            dir,
            root,
            registry,
            synchronizer,
        }
    }

    fn write_root_key(dir: &Path, root: &Keypair) {
        std::fs::write(
            dir.join(ROOT_KEY_FILE_NAME),
            serde_json::to_vec(&root.to_bytes().to_vec()).unwrap(),
        )
        .unwrap();
    }

    fn live(lamports: u64) -> LiveAccount {
        LiveAccount {
            lamports,
            owner: solana_sdk::system_program::id(),
            executable: false,
            rent_epoch: 0,
            data: vec![],
        }
    }

    fn transfers(transaction: &Transaction) -> Vec<(Pubkey, Pubkey, u64)> {
        let keys = &transaction.message.account_keys;
        transaction
            .message
            .instructions
            .iter()
            .map(|ix: &CompiledInstruction| {
                match bincode::deserialize::<SystemInstruction>(&ix.data).unwrap() {
                    SystemInstruction::Transfer { lamports } => (
                        keys[ix.accounts[0] as usize],
                        keys[ix.accounts[1] as usize],
                        lamports,
                    ),
                    other => panic!("unexpected instruction {other:?}"),
                }
            })
            .collect()
    }

    fn client_for_bootstrap(root: Pubkey) -> MockClusterClient {
        let mut client = MockClusterClient::new();
        client.expect_net().return_const(Net::Localhost);
        client
            .expect_latest_blockhash()
            .returning(|| Ok(Hash::new_unique()));
        client
            .expect_submit_and_confirm()
            .withf(move |tx| {
                let transfers = transfers(tx);
                tx.verify().is_ok()
                    && transfers.len() == BOOTSTRAP_ACCOUNTS
                    && transfers
                        .iter()
                        .all(|(from, _, lamports)| *from == root && *lamports == 10 * LAMPORTS_PER_SOL)
            })
            .times(1)
            .returning(|_| Ok(Signature::default()));
        client
    }

    #[tokio::test]
    async fn empty_registry_bootstraps_five_funded_wallets() {
        let f = fixture();
        let mut client = client_for_bootstrap(f.root.pubkey());
        client.expect_get_accounts_batch().never();

        let response = f.synchronizer.synchronize(&client).await.unwrap();

        assert_eq!(response.root_key, f.root.pubkey());
        assert_eq!(response.accounts.len(), BOOTSTRAP_ACCOUNTS);
        let entries = f.registry.list().await.unwrap();
        assert_eq!(entries.len(), BOOTSTRAP_ACCOUNTS);
        for (i, (entry, account)) in entries.iter().zip(&response.accounts).enumerate() {
            assert_eq!(entry.pubkey, account.pub_key);
            assert_eq!(entry.human_name, Some(format!("Wallet {i}")));
            assert_eq!(entry.net, Some(Net::Localhost));
            assert!(!account.art.is_empty());
            assert_eq!(account.lamports, None);
        }
    }

    #[tokio::test]
    async fn failed_funding_registers_nothing() {
        let f = fixture();
        let mut client = MockClusterClient::new();
        client.expect_net().return_const(Net::Localhost);
        client
            .expect_latest_blockhash()
            .returning(|| Ok(Hash::new_unique()));
        client
            .expect_submit_and_confirm()
            .returning(|tx| {
                Err(ClusterError::ConfirmationTimeout {
                    signature: tx.signatures[0],
                    timeout: std::time::Duration::from_secs(60),
                })
            });

        let result = f.synchronizer.synchronize(&client).await;

        assert!(matches!(
            result,
            Err(WorkbenchError::Cluster(ClusterError::ConfirmationTimeout { .. }))
        ));
        assert!(f.registry.list().await.unwrap().is_empty());
        // funded or not, every generated wallet key is on disk
        let key_files = std::fs::read_dir(f.dir.path()).unwrap().count();
        assert_eq!(key_files, 1 + BOOTSTRAP_ACCOUNTS);
    }

    #[tokio::test]
    async fn known_accounts_are_refreshed_with_one_batch_fetch() {
        let f = fixture();
        let entries: Vec<RegistryEntry> = (0..7)
            .map(|i| RegistryEntry {
                pubkey: Pubkey::new_unique(),
                net: Some(Net::Localhost),
                human_name: Some(format!("Wallet {i}")),
            })
            .collect();
        f.registry.insert_all(entries.clone()).await.unwrap();

        let expected_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
        let mut client = MockClusterClient::new();
        client
            .expect_get_accounts_batch()
            .withf(move |keys| keys == expected_keys.as_slice())
            .times(1)
            .returning(|keys| {
                Ok(keys
                    .iter()
                    .enumerate()
                    .map(|(i, _)| (i % 2 == 0).then(|| live(i as u64 * LAMPORTS_PER_SOL)))
                    .collect())
            });
        client.expect_submit_and_confirm().never();

        let response = f.synchronizer.synchronize(&client).await.unwrap();

        assert_eq!(response.accounts.len(), entries.len());
        for (i, (entry, account)) in entries.iter().zip(&response.accounts).enumerate() {
            assert_eq!(account.pub_key, entry.pubkey);
            assert_eq!(account.human_name, entry.human_name);
            if i % 2 == 0 {
                assert_eq!(account.lamports, Some(i as u64 * LAMPORTS_PER_SOL));
                assert_eq!(account.sol_amount, Some(i as f64));
            } else {
                assert_eq!(account.lamports, None);
            }
        }
    }

    #[tokio::test]
    async fn short_batch_response_is_rejected() {
        let f = fixture();
        f.registry
            .insert(RegistryEntry {
                pubkey: Pubkey::new_unique(),
                net: None,
                human_name: None,
            })
            .await
            .unwrap();
        let mut client = MockClusterClient::new();
        client
            .expect_get_accounts_batch()
            .returning(|_| Ok(vec![]));

        let result = f.synchronizer.synchronize(&client).await;

        assert!(matches!(
            result,
            Err(WorkbenchError::Cluster(ClusterError::MalformedResponse(_)))
        ));
    }

    #[tokio::test]
    async fn concurrent_first_runs_bootstrap_once() {
        let f = fixture();
        let mut client = client_for_bootstrap(f.root.pubkey());
        client
            .expect_get_accounts_batch()
            .returning(|keys| Ok(keys.iter().map(|_| Some(live(LAMPORTS_PER_SOL))).collect()));

        let (a, b) = tokio::join!(
            f.synchronizer.synchronize(&client),
            f.synchronizer.synchronize(&client)
        );

        assert_eq!(a.unwrap().accounts.len(), BOOTSTRAP_ACCOUNTS);
        assert_eq!(b.unwrap().accounts.len(), BOOTSTRAP_ACCOUNTS);
        assert_eq!(f.registry.list().await.unwrap().len(), BOOTSTRAP_ACCOUNTS);
    }

    #[tokio::test]
    async fn added_keypair_is_airdropped_and_registered() {
        let f = fixture();
        f.registry
            .insert(RegistryEntry {
                pubkey: Pubkey::new_unique(),
                net: Some(Net::Localhost),
                human_name: Some("Wallet 0".to_string()),
            })
            .await
            .unwrap();
        let mut client = MockClusterClient::new();
        client.expect_net().return_const(Net::Localhost);
        client
            .expect_request_airdrop()
            .withf(|_, lamports| *lamports == 100 * LAMPORTS_PER_SOL)
            .times(1)
            .returning(|_, _| Ok(Signature::default()));
        client
            .expect_get_accounts_batch()
            .times(1)
            .returning(|keys| Ok(keys.iter().map(|_| Some(live(LAMPORTS_PER_SOL))).collect()));

        let response = f.synchronizer.add_keypair(&client).await.unwrap();

        assert_eq!(response.accounts.len(), 2);
        assert_eq!(response.accounts[1].human_name.as_deref(), Some("Wallet 1"));
        assert_eq!(response.accounts[1].lamports, Some(LAMPORTS_PER_SOL));
    }

    #[tokio::test]
    async fn added_keypair_on_empty_registry_bootstraps_first() {
        let f = fixture();
        let mut client = client_for_bootstrap(f.root.pubkey());
        client
            .expect_request_airdrop()
            .withf(|_, lamports| *lamports == 100 * LAMPORTS_PER_SOL)
            .times(1)
            .returning(|_, _| Ok(Signature::default()));
        client
            .expect_get_accounts_batch()
            .times(1)
            .returning(|keys| Ok(keys.iter().map(|_| Some(live(LAMPORTS_PER_SOL))).collect()));

        let response = f.synchronizer.add_keypair(&client).await.unwrap();

        assert_eq!(response.accounts.len(), BOOTSTRAP_ACCOUNTS + 1);
        let names: Vec<_> = response
            .accounts
            .iter()
            .map(|a| a.human_name.clone().unwrap())
            .collect();
        let expected: Vec<_> = (0..=BOOTSTRAP_ACCOUNTS).map(|i| format!("Wallet {i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn concurrent_added_keypairs_get_distinct_names() {
        let f = fixture();
        f.registry
            .insert(RegistryEntry {
                pubkey: Pubkey::new_unique(),
                net: Some(Net::Localhost),
                human_name: Some("Wallet 0".to_string()),
            })
            .await
            .unwrap();
        let mut client = MockClusterClient::new();
        client.expect_net().return_const(Net::Localhost);
        client
            .expect_request_airdrop()
            .times(2)
            .returning(|_, _| Ok(Signature::default()));
        client
            .expect_get_accounts_batch()
            .returning(|keys| Ok(keys.iter().map(|_| None).collect()));
        client.expect_submit_and_confirm().never();

        let (a, b) = tokio::join!(
            f.synchronizer.add_keypair(&client),
            f.synchronizer.add_keypair(&client)
        );
        a.unwrap();
        b.unwrap();

        let names: Vec<_> = f
            .registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.human_name.unwrap())
            .collect();
        assert_eq!(names, vec!["Wallet 0", "Wallet 1", "Wallet 2"]);
    }
}
