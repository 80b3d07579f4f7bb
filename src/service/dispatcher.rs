//! Request/response messages exchanged with the GUI and their dispatch onto
//! the application.
//!
//! Every request is handled on its own task. Failures, including panics of
//! that task, are logged and turned into a `failed` response for that
//! request only.

use crate::{
    application::app::Application,
    domain::{
        errors::WorkbenchError,
        models::{Account, AccountsResponse, Net, NetStatus},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetRequest {
    pub net: Net,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ValidatorLogsRequest {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAccountRequest {
    pub net: Net,
    pub pub_key: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub pub_key: String,
    pub human_name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccountRequest {
    pub net: Net,
    pub pub_key: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirdropRequest {
    pub net: Net,
    pub pub_key: String,
    pub sol: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FetchIdlRequest {
    #[serde(rename = "programID")]
    pub program_id: String,
    #[serde(default)]
    pub net: Option<Net>,
}

/// A message from the GUI, tagged with the channel it was sent on.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "channel", content = "msg", rename_all = "kebab-case")]
pub enum Request {
    SolState(NetRequest),
    RunValidator,
    ValidatorLogs(ValidatorLogsRequest),
    GetAccount(GetAccountRequest),
    Accounts(NetRequest),
    UpdateAccountName(UpdateAccountRequest),
    ImportAccount(ImportAccountRequest),
    AddKeypair(NetRequest),
    Airdrop(AirdropRequest),
    FetchAnchorIdl(FetchIdlRequest),
}

impl Request {
    pub fn channel(&self) -> &'static str {
        match self {
            Request::SolState(_) => "sol-state",
            Request::RunValidator => "run-validator",
            Request::ValidatorLogs(_) => "validator-logs",
            Request::GetAccount(_) => "get-account",
            Request::Accounts(_) => "accounts",
            Request::UpdateAccountName(_) => "update-account-name",
            Request::ImportAccount(_) => "import-account",
            Request::AddKeypair(_) => "add-keypair",
            Request::Airdrop(_) => "airdrop",
            Request::FetchAnchorIdl(_) => "fetch-anchor-idl",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReply {
    pub status: NetStatus,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccountReply {
    pub account: Option<Account>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdatedRows {
    pub changes: usize,
}

/// The successful result of a request.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Status(StatusReply),
    Empty {},
    Logs(String),
    Account(AccountReply),
    Accounts(AccountsResponse),
    Updated(UpdatedRows),
    Imported(Account),
    Signature(String),
    Idl(serde_json::Value),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        channel: &'static str,
        reply: Reply,
    },
    Failed {
        channel: &'static str,
        error: String,
    },
}

/// Handles `request` on a task of its own.
pub async fn dispatch<A>(app: Arc<A>, request: Request) -> Response
where
    A: Application + Send + Sync + 'static,
{
    let channel = request.channel();
    tracing::info!("IPC event on {}: {:?}", channel, request);

    let handle = tokio::spawn(handle(app, request));
    let result = match handle.await {
        Ok(result) => result,
        Err(e) if channel == "sol-state" => {
            tracing::error!("Probe task failed: {}", e);
            Ok(Reply::Status(StatusReply {
                status: NetStatus::Unknown,
            }))
        }
        Err(e) => {
            tracing::error!("IPC task on {} failed: {}", channel, e);
            return Response::Failed {
                channel,
                error: "internal error".to_string(),
            };
        }
    };

    match result {
        Ok(reply) => Response::Ok { channel, reply },
        Err(e) => {
            tracing::error!("IPC error on {}: {}", channel, e);
            Response::Failed {
                channel,
                error: e.to_string(),
            }
        }
    }
}

async fn handle<A>(app: Arc<A>, request: Request) -> Result<Reply, WorkbenchError>
where
    A: Application + Send + Sync + 'static,
{
    let reply = match request {
        Request::SolState(NetRequest { net }) => Reply::Status(StatusReply {
            status: app.cluster_status(net).await,
        }),
        Request::RunValidator => {
            app.run_validator().await?;
            Reply::Empty {}
        }
        Request::ValidatorLogs(ValidatorLogsRequest { filter }) => {
            Reply::Logs(app.validator_logs(filter).await?)
        }
        Request::GetAccount(GetAccountRequest { net, pub_key }) => Reply::Account(AccountReply {
            account: app.get_account(net, &pub_key).await?,
        }),
        Request::Accounts(NetRequest { net }) => Reply::Accounts(app.accounts(net).await?),
        Request::UpdateAccountName(UpdateAccountRequest {
            pub_key,
            human_name,
        }) => Reply::Updated(UpdatedRows {
            changes: app.update_account_name(&pub_key, &human_name).await?,
        }),
        Request::ImportAccount(ImportAccountRequest { net, pub_key }) => {
            Reply::Imported(app.import_account(net, &pub_key).await?)
        }
        Request::AddKeypair(NetRequest { net }) => Reply::Accounts(app.add_keypair(net).await?),
        Request::Airdrop(AirdropRequest { net, pub_key, sol }) => {
            Reply::Signature(app.airdrop(net, &pub_key, sol).await?.to_string())
        }
        Request::FetchAnchorIdl(FetchIdlRequest { program_id, net }) => {
            Reply::Idl(app.fetch_anchor_idl(&program_id, net).await?)
        }
    };
    Ok(reply)
}
