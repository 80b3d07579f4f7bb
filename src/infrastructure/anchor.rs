use crate::domain::{errors::SupervisorError, models::Net};
use solana_sdk::pubkey::Pubkey;
use std::{path::PathBuf, process::Stdio};
use tokio::process::Command;

/// Reads Anchor program interfaces published on-chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IdlFetcher: Send + Sync {
    /// Fetches the IDL of an Anchor program.
    ///
    /// # Arguments
    ///
    /// * `program_id` - The program whose IDL account is read.
    /// * `net` - Cluster to read from. `None` leaves the choice to the Anchor workspace configuration.
    ///
    /// # Returns
    ///
    /// * `Result<serde_json::Value, SupervisorError>` - The IDL document.
    async fn fetch_idl(
        &self,
        program_id: &Pubkey,
        net: Option<Net>,
    ) -> Result<serde_json::Value, SupervisorError>;
}

/// Shells out to the `anchor` command line.
#[derive(Clone, Debug)]
pub struct AnchorCli {
    anchor_path: PathBuf,
}

impl AnchorCli {
    pub fn new(anchor_path: impl Into<PathBuf>) -> Self {
        Self {
            anchor_path: anchor_path.into(),
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.anchor_path.display(), args.join(" "))
    }
}

fn idl_fetch_args(program_id: &Pubkey, net: Option<Net>) -> Vec<String> {
    let mut args = vec!["idl".to_string(), "fetch".to_string(), program_id.to_string()];
    if let Some(net) = net {
        args.push("--provider.cluster".to_string());
        args.push(net.rpc_url().to_string());
    }
    args
}

fn parse_idl(command: &str, stdout: &[u8]) -> Result<serde_json::Value, SupervisorError> {
    serde_json::from_slice(stdout).map_err(|e| SupervisorError::MalformedOutput {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait::async_trait]
impl IdlFetcher for AnchorCli {
    async fn fetch_idl(
        &self,
        program_id: &Pubkey,
        net: Option<Net>,
    ) -> Result<serde_json::Value, SupervisorError> {
        let args = idl_fetch_args(program_id, net);
        let command = self.command_line(&args);
        tracing::info!("Fetching IDL: {}", command);

        let output = Command::new(&self.anchor_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SupervisorError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SupervisorError::CommandFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_idl(&command, &output.stdout)
    }
}
