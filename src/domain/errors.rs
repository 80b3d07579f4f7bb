use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("RPC request to {endpoint} failed: {reason}")]
    Network { endpoint: String, reason: String },
    #[error("Failed to fetch account {pubkey}: {reason}")]
    AccountFetch { pubkey: Pubkey, reason: String },
    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),
    #[error("Failed to submit transaction: {0}")]
    Submission(String),
    #[error("Transaction {signature} not finalized within {timeout:?}")]
    ConfirmationTimeout {
        signature: Signature,
        timeout: Duration,
    },
}

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Failed to access key file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed key file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("Failed to fund new root key: {0}")]
    Network(#[from] ClusterError),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Account {0} is already registered")]
    Conflict(Pubkey),
    #[error("Registry storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Corrupt registry row, column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
    #[error("Registry task failed: {0}")]
    TaskFailed(String),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("`{command}` produced unreadable output: {reason}")]
    MalformedOutput { command: String, reason: String },
    #[error("Invalid log filter `{pattern}`: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("Invalid public key {0}")]
    InvalidPubkey(String),
    #[error("Invalid SOL amount {0}")]
    InvalidAmount(f64),
}
