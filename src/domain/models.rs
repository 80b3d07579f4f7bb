use super::art;
use serde::{Deserialize, Serialize};
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey};
use std::{fmt, str::FromStr};

/// One of the fixed cluster targets the workbench can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Net {
    #[serde(rename = "localhost")]
    Localhost,
    #[serde(rename = "dev")]
    Dev,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
}

impl Net {
    pub const ALL: [Net; 4] = [Net::Localhost, Net::Dev, Net::Test, Net::MainnetBeta];

    /// Well-known RPC endpoint of the cluster.
    pub fn rpc_url(self) -> &'static str {
        match self {
            Net::Localhost => "http://127.0.0.1:8899",
            Net::Dev => "https://api.devnet.solana.com",
            Net::Test => "https://api.testnet.solana.com",
            Net::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Net::Localhost => "localhost",
            Net::Dev => "dev",
            Net::Test => "test",
            Net::MainnetBeta => "mainnet-beta",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Net {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Net::ALL
            .into_iter()
            .find(|net| net.as_str() == s)
            .ok_or_else(|| format!("unknown network: {s}"))
    }
}

/// Reachability of a cluster or of the local validator container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetStatus {
    Running,
    Unavailable,
    Unknown,
}

/// Raw on-chain state of an account as last reported by the cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAccount {
    pub lamports: u64,
    #[serde(with = "pubkey_string")]
    pub owner: Pubkey,
    pub executable: bool,
    pub rent_epoch: u64,
    /// Account data, hex encoded on the wire
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

impl From<solana_sdk::account::Account> for LiveAccount {
    fn from(account: solana_sdk::account::Account) -> Self {
        Self {
            lamports: account.lamports,
            owner: account.owner,
            executable: account.executable,
            rent_epoch: account.rent_epoch,
            data: account.data,
        }
    }
}

/// Persisted part of an account: identity, network tag and display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    pub pubkey: Pubkey,
    pub net: Option<Net>,
    pub human_name: Option<String>,
}

/// An account known to the workbench, combining the registry entry with
/// the cluster state fetched on the last synchronization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(with = "pubkey_string")]
    pub pub_key: Pubkey,
    pub human_name: Option<String>,
    pub net: Option<Net>,
    pub lamports: Option<u64>,
    pub sol_amount: Option<f64>,
    pub sol_account: Option<LiveAccount>,
    pub art: String,
}

impl Account {
    /// An account with no cached cluster state.
    pub fn new(pubkey: Pubkey) -> Self {
        Self {
            pub_key: pubkey,
            human_name: None,
            net: None,
            lamports: None,
            sol_amount: None,
            sol_account: None,
            art: art::fingerprint(&pubkey.to_bytes()),
        }
    }

    pub fn from_entry(entry: RegistryEntry) -> Self {
        Self {
            human_name: entry.human_name,
            net: entry.net,
            ..Self::new(entry.pubkey)
        }
    }

    /// Overlays live cluster state onto this account.
    ///
    /// The cluster is authoritative for financial state: lamports, SOL amount
    /// and the raw payload are always replaced, and cleared when the account
    /// does not exist on chain. The registry is authoritative for identity:
    /// public key, name and network tag are never touched. The fingerprint is
    /// recomputed from the key.
    pub fn merge_live(self, live: Option<LiveAccount>) -> Self {
        let lamports = live.as_ref().map(|a| a.lamports);
        Self {
            lamports,
            sol_amount: lamports.map(lamports_to_sol),
            sol_account: live,
            art: art::fingerprint(&self.pub_key.to_bytes()),
            ..self
        }
    }
}

/// Result of listing or synchronizing the accounts of the workbench.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    #[serde(with = "pubkey_string")]
    pub root_key: Pubkey,
    pub accounts: Vec<Account>,
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64) as u64
}

/// Converts a user-supplied SOL amount, rejecting amounts that are not a
/// positive number of lamports representable in a `u64`.
pub fn checked_sol_to_lamports(sol: f64) -> Option<u64> {
    let lamports = sol * LAMPORTS_PER_SOL as f64;
    if !lamports.is_finite() || lamports < 1.0 || lamports >= u64::MAX as f64 {
        return None;
    }
    Some(lamports as u64)
}

/// Serializes a `Pubkey` as its base58 string.
pub(crate) mod pubkey_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(pubkey)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(lamports: u64) -> LiveAccount {
        LiveAccount {
            lamports,
            owner: solana_sdk::system_program::id(),
            executable: false,
            rent_epoch: 0,
            data: vec![0xde, 0xad],
        }
    }

    #[test]
    fn merge_overwrites_balance_but_keeps_identity() {
        let pubkey = Pubkey::new_unique();
        let account = Account::from_entry(RegistryEntry {
            pubkey,
            net: Some(Net::Localhost),
            human_name: Some("Wallet 0".to_string()),
        })
        .merge_live(Some(live(LAMPORTS_PER_SOL)));

        let merged = account.merge_live(Some(live(3 * LAMPORTS_PER_SOL / 2)));

        assert_eq!(merged.pub_key, pubkey);
        assert_eq!(merged.human_name.as_deref(), Some("Wallet 0"));
        assert_eq!(merged.net, Some(Net::Localhost));
        assert_eq!(merged.lamports, Some(1_500_000_000));
        assert_eq!(merged.sol_amount, Some(1.5));
        assert_eq!(merged.art, art::fingerprint(&pubkey.to_bytes()));
    }

    #[test]
    fn merge_with_missing_account_clears_cached_state() {
        let account = Account::new(Pubkey::new_unique()).merge_live(Some(live(42)));

        let merged = account.merge_live(None);

        assert_eq!(merged.lamports, None);
        assert_eq!(merged.sol_amount, None);
        assert_eq!(merged.sol_account, None);
    }

    #[test]
    fn net_round_trips_through_its_name() {
        for net in Net::ALL {
            assert_eq!(net.as_str().parse::<Net>(), Ok(net));
        }
        assert!("nowhere".parse::<Net>().is_err());
    }

    #[test]
    fn account_serializes_keys_as_base58() {
        let pubkey = Pubkey::new_unique();
        let json = serde_json::to_value(Account::new(pubkey).merge_live(Some(live(7)))).unwrap();

        assert_eq!(json["pubKey"], pubkey.to_string());
        assert_eq!(json["solAccount"]["data"], "dead");
        assert_eq!(json["solAccount"]["owner"], solana_sdk::system_program::id().to_string());
    }

    #[test]
    fn only_positive_finite_amounts_convert() {
        assert_eq!(checked_sol_to_lamports(1.5), Some(1_500_000_000));
        assert_eq!(checked_sol_to_lamports(0.0), None);
        assert_eq!(checked_sol_to_lamports(-1.0), None);
        assert_eq!(checked_sol_to_lamports(f64::NAN), None);
        assert_eq!(checked_sol_to_lamports(f64::INFINITY), None);
        assert_eq!(checked_sol_to_lamports(1e12), None);
    }
}
