use crate::domain::{
    errors::RegistryError,
    models::{Net, RegistryEntry},
};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, Transaction};
use solana_sdk::pubkey::Pubkey;
use std::{path::Path, str::FromStr, sync::Arc};

/// Schema migrations, applied in order and recorded in the `migration` table.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "create-account",
    "CREATE TABLE account (
        pubkey TEXT PRIMARY KEY NOT NULL,
        net TEXT,
        human_name TEXT
    );",
)];

/// Trait for the table of locally known accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Retrieves all registered accounts in insertion order.
    async fn list(&self) -> Result<Vec<RegistryEntry>, RegistryError>;

    /// Registers a new account. Fails with `RegistryError::Conflict` if the key is already known.
    async fn insert(&self, entry: RegistryEntry) -> Result<RegistryEntry, RegistryError>;

    /// Registers several accounts at once; either all of them are stored or none.
    async fn insert_all(&self, entries: Vec<RegistryEntry>) -> Result<(), RegistryError>;

    /// Changes the display name of an account, returning the number of updated rows.
    async fn rename(&self, pubkey: Pubkey, human_name: String) -> Result<usize, RegistryError>;
}

/// `AccountRegistry` stored in a SQLite database.
///
/// Statements run on the blocking pool, serialized by the connection lock.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, RegistryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, RegistryError> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RegistryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| RegistryError::TaskFailed(e.to_string()))?
    }
}

fn migrate(conn: &mut Connection) -> Result<(), RegistryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migration (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    for (id, name, sql) in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM migration WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if applied {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO migration (id, name, applied_at) VALUES (?1, ?2, ?3)",
            params![id, name, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        tracing::info!("Applied registry migration {} ({})", id, name);
    }
    Ok(())
}

fn insert_entry(tx: &Transaction<'_>, entry: &RegistryEntry) -> Result<(), RegistryError> {
    tx.execute(
        "INSERT INTO account (pubkey, net, human_name) VALUES (?1, ?2, ?3)",
        params![
            entry.pubkey.to_string(),
            entry.net.map(Net::as_str),
            entry.human_name
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            RegistryError::Conflict(entry.pubkey)
        }
        e => RegistryError::Storage(e),
    })?;
    Ok(())
}

fn parse_row(
    pubkey: String,
    net: Option<String>,
    human_name: Option<String>,
) -> Result<RegistryEntry, RegistryError> {
    let pubkey = Pubkey::from_str(&pubkey).map_err(|_| RegistryError::Corrupt {
        column: "pubkey",
        value: pubkey.clone(),
    })?;
    let net = net
        .map(|net| {
            Net::from_str(&net).map_err(|_| RegistryError::Corrupt {
                column: "net",
                value: net.clone(),
            })
        })
        .transpose()?;
    Ok(RegistryEntry {
        pubkey,
        net,
        human_name,
    })
}

#[async_trait::async_trait]
impl AccountRegistry for SqliteRegistry {
    async fn list(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT pubkey, net, human_name FROM account ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<(String, Option<String>, Option<String>)>, _>>()?;
            rows.into_iter()
                .map(|(pubkey, net, human_name)| parse_row(pubkey, net, human_name))
                .collect()
        })
        .await
    }

    async fn insert(&self, entry: RegistryEntry) -> Result<RegistryEntry, RegistryError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            insert_entry(&tx, &entry)?;
            tx.commit()?;
            tracing::info!("Registered account {}", entry.pubkey);
            Ok(entry)
        })
        .await
    }

    async fn insert_all(&self, entries: Vec<RegistryEntry>) -> Result<(), RegistryError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for entry in &entries {
                insert_entry(&tx, entry)?;
            }
            tx.commit()?;
            tracing::info!("Registered {} accounts", entries.len());
            Ok(())
        })
        .await
    }

    async fn rename(&self, pubkey: Pubkey, human_name: String) -> Result<usize, RegistryError> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE account SET human_name = ?1 WHERE pubkey = ?2",
                params![human_name, pubkey.to_string()],
            )?;
            if updated == 0 {
                tracing::warn!("Rename of unknown account {}", pubkey);
            }
            Ok(updated)
        })
        .await
    }
}
