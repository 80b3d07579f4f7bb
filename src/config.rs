//! Runtime configuration of the workbench backend.
//!
//! Everything host dependent (home directory, docker location, validator
//! image) is resolved once at startup and handed to the components
//! explicitly.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use typed_builder::TypedBuilder;

pub const WORKBENCH_DIR_NAME: &str = ".solana-workbench";
pub const DB_FILE_NAME: &str = "wb.db";
/// Resolved through `PATH`.
pub const DEFAULT_ANCHOR_PATH: &str = "anchor";

#[derive(Clone, Debug, TypedBuilder)]
pub struct WorkbenchConfig {
    /// Root of the persisted state: keys, logs and the account database
    #[builder(setter(into))]
    pub workbench_dir: PathBuf,
    #[builder(default = default_docker_path(), setter(into))]
    pub docker_path: PathBuf,
    #[builder(default = default_docker_image().to_string(), setter(into))]
    pub docker_image: String,
    #[builder(default = PathBuf::from(DEFAULT_ANCHOR_PATH), setter(into))]
    pub anchor_path: PathBuf,
    /// Upper bound for a single RPC request, including cluster probes
    #[builder(default = Duration::from_secs(5))]
    pub request_timeout: Duration,
    /// Upper bound for waiting on transaction finality
    #[builder(default = Duration::from_secs(60))]
    pub confirm_timeout: Duration,
}

impl WorkbenchConfig {
    pub fn keys_dir(&self) -> PathBuf {
        self.workbench_dir.join("keys")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.workbench_dir.join("logs")
    }

    pub fn db_path(&self) -> PathBuf {
        self.workbench_dir.join(DB_FILE_NAME)
    }

    /// Creates the workbench, keys and logs directories if missing.
    pub fn prepare_dirs(&self) -> io::Result<()> {
        for dir in [self.workbench_dir.clone(), self.keys_dir(), self.log_dir()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// `~/.solana-workbench`, if the home directory is known.
pub fn default_workbench_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(Path::new(&home).join(WORKBENCH_DIR_NAME))
}

pub fn default_docker_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("docker")
    } else {
        PathBuf::from("/usr/local/bin/docker")
    }
}

pub fn default_docker_image() -> &'static str {
    if std::env::consts::ARCH == "aarch64" {
        "nathanleclaire/solana:v1.9.2"
    } else {
        "solanalabs/solana:v1.9.2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lives_under_the_workbench_dir() {
        let config = WorkbenchConfig::builder().workbench_dir("/tmp/wb").build();

        assert_eq!(config.keys_dir(), PathBuf::from("/tmp/wb/keys"));
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/wb/logs"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/wb/wb.db"));
        assert_eq!(config.docker_image, default_docker_image());
        assert_eq!(config.confirm_timeout, Duration::from_secs(60));
    }

    #[test]
    fn prepare_dirs_creates_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkbenchConfig::builder()
            .workbench_dir(dir.path().join(WORKBENCH_DIR_NAME))
            .build();

        config.prepare_dirs().unwrap();

        assert!(config.keys_dir().is_dir());
        assert!(config.log_dir().is_dir());
    }
}
