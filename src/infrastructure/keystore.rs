use crate::domain::{errors::KeystoreError, models::sol_to_lamports};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{io::AsyncWriteExt, sync::Mutex};

use super::cluster_client::ClusterClient;

pub const ROOT_KEY_FILE_NAME: &str = "wbkey.json";
/// SOL airdropped to every key the workbench creates on its own.
pub const AIRDROP_SOL: f64 = 100.0;

/// Custody of the keys the workbench owns.
///
/// Keys are stored in the Solana CLI format: a JSON array with the 64 bytes
/// of the secret and public halves. Files are only ever created, never
/// rewritten.
pub struct Keystore {
    keys_dir: PathBuf,
    lock: Mutex<()>,
}

impl Keystore {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root_key_path(&self) -> PathBuf {
        self.keys_dir.join(ROOT_KEY_FILE_NAME)
    }

    /// Public key of the root keypair, if one was created already.
    pub async fn root_pubkey(&self) -> Result<Option<Pubkey>, KeystoreError> {
        match read_keypair(&self.root_key_path()).await {
            Ok(keypair) => Ok(Some(keypair.pubkey())),
            Err(KeystoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Loads the root keypair, creating and funding it on first use.
    ///
    /// A new key is only written once its airdrop is finalized, so an
    /// unfunded root key never lands on disk. An existing but malformed key
    /// file is reported, never replaced.
    pub async fn ensure_root_keypair(
        &self,
        client: &dyn ClusterClient,
    ) -> Result<Keypair, KeystoreError> {
        let _guard = self.lock.lock().await;
        let path = self.root_key_path();

        match read_keypair(&path).await {
            Ok(keypair) => return Ok(keypair),
            Err(KeystoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        tracing::info!("Creating root key at {}", path.display());
        let keypair = Keypair::new();
        client
            .request_airdrop(&keypair.pubkey(), sol_to_lamports(AIRDROP_SOL))
            .await?;

        match write_keypair(&path, &keypair).await {
            Ok(()) => Ok(keypair),
            // another process won the race, its key is the root key
            Err(KeystoreError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!("Root key at {} appeared concurrently", path.display());
                read_keypair(&path).await
            }
            Err(e) => Err(e),
        }
    }

    /// Stores the secret key of a wallet generated by the workbench.
    pub async fn store_wallet(&self, keypair: &Keypair) -> Result<PathBuf, KeystoreError> {
        let path = self.keys_dir.join(format!("{}.json", keypair.pubkey()));
        write_keypair(&path, keypair).await?;
        Ok(path)
    }
}

async fn read_keypair(path: &Path) -> Result<Keypair, KeystoreError> {
    let contents = tokio::fs::read(path).await.map_err(|source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |reason: String| KeystoreError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    let bytes: Vec<u8> = serde_json::from_slice(&contents).map_err(|e| parse_error(e.to_string()))?;
    Keypair::from_bytes(&bytes).map_err(|e| parse_error(e.to_string()))
}

async fn write_keypair(path: &Path, keypair: &Keypair) -> Result<(), KeystoreError> {
    let io_error = |source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    }
    let contents = serde_json::to_vec(&keypair.to_bytes().to_vec()).map_err(|e| {
        KeystoreError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_error)?;
    file.write_all(&contents).await.map_err(io_error)?;
    file.sync_all().await.map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::errors::ClusterError, infrastructure::cluster_client::MockClusterClient};
    use solana_sdk::signature::Signature;

    fn write_key_file(dir: &Path, keypair: &Keypair) {
        std::fs::write(
            dir.join(ROOT_KEY_FILE_NAME),
            serde_json::to_vec(&keypair.to_bytes().to_vec()).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn existing_root_key_is_loaded_without_airdrop() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = Keypair::new();
        write_key_file(dir.path(), &keypair);
        let mut client = MockClusterClient::new();
        client.expect_request_airdrop().never();

        let keystore = Keystore::new(dir.path());
        let loaded = keystore.ensure_root_keypair(&client).await.unwrap();

        assert_eq!(loaded.pubkey(), keypair.pubkey());
        assert_eq!(keystore.root_pubkey().await.unwrap(), Some(keypair.pubkey()));
    }

    #[tokio::test]
    async fn missing_root_key_is_funded_then_persisted_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MockClusterClient::new();
        client
            .expect_request_airdrop()
            .withf(|_, lamports| *lamports == 100_000_000_000)
            .times(1)
            .returning(|_, _| Ok(Signature::default()));

        let keystore = Keystore::new(dir.path().join("keys"));
        assert_eq!(keystore.root_pubkey().await.unwrap(), None);

        let created = keystore.ensure_root_keypair(&client).await.unwrap();
        let reloaded = keystore.ensure_root_keypair(&client).await.unwrap();

        assert_eq!(created.pubkey(), reloaded.pubkey());
        assert!(keystore.root_key_path().exists());
    }

    #[tokio::test]
    async fn failed_airdrop_leaves_no_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = MockClusterClient::new();
        client.expect_request_airdrop().returning(|_, _| {
            Err(ClusterError::Submission("faucet is dry".to_string()))
        });

        let keystore = Keystore::new(dir.path());
        let result = keystore.ensure_root_keypair(&client).await;

        assert!(matches!(result, Err(KeystoreError::Network(_))));
        assert!(!keystore.root_key_path().exists());
    }

    #[tokio::test]
    async fn corrupt_root_key_is_reported_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ROOT_KEY_FILE_NAME);
        std::fs::write(&path, b"[1, 2, 3").unwrap();
        let mut client = MockClusterClient::new();
        client.expect_request_airdrop().never();

        let keystore = Keystore::new(dir.path());
        let result = keystore.ensure_root_keypair(&client).await;

        assert!(matches!(result, Err(KeystoreError::Parse { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"[1, 2, 3");
    }

    #[tokio::test]
    async fn wallet_keys_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Keystore::new(dir.path());
        let wallet = Keypair::new();

        let path = keystore.store_wallet(&wallet).await.unwrap();
        assert_eq!(read_keypair(&path).await.unwrap().pubkey(), wallet.pubkey());

        let again = keystore.store_wallet(&wallet).await;
        assert!(matches!(
            again,
            Err(KeystoreError::Io { ref source, .. }) if source.kind() == ErrorKind::AlreadyExists
        ));
    }
}
