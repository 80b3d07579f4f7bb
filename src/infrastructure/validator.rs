use crate::domain::{errors::SupervisorError, models::NetStatus};
use regex::Regex;
use std::{
    path::PathBuf,
    process::{Output, Stdio},
};
use tokio::{io::AsyncReadExt, process::Command};

pub const CONTAINER_NAME: &str = "solana-test-validator";
/// Lines read from the container when searching for a filter.
pub const MAX_TAIL_LINES: usize = 10_000;
/// Lines handed back to the caller.
pub const MAX_DISPLAY_LINES: usize = 30;
/// Cap on the log bytes read from the container runtime.
pub const MAX_LOG_BYTES: u64 = 100 * 1024 * 1024;

/// A trait representing the supervisor of the local test validator.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ValidatorSupervisor: Send + Sync {
    /// Reports whether the validator container is running.
    async fn probe_status(&self) -> NetStatus;

    /// Starts the validator, creating its container on first use. No-op if it is already running.
    async fn start(&self) -> Result<(), SupervisorError>;

    /// Retrieves the tail of the validator logs.
    ///
    /// # Arguments
    ///
    /// * `filter` - Regular expression a line must match to be kept. `None` or an empty filter keeps every line.
    ///
    /// # Returns
    ///
    /// * `Result<String, SupervisorError>` - At most `MAX_DISPLAY_LINES` lines, oldest first.
    async fn tail_logs(&self, filter: Option<String>) -> Result<String, SupervisorError>;
}

/// Runs the validator as a docker container.
#[derive(Clone, Debug)]
pub struct DockerSupervisor {
    docker_path: PathBuf,
    image: String,
    container: String,
}

impl DockerSupervisor {
    pub fn new(docker_path: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
            image: image.into(),
            container: CONTAINER_NAME.to_string(),
        }
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.docker_path.display(), args.join(" "))
    }

    async fn docker(&self, args: &[&str]) -> Result<Output, SupervisorError> {
        Command::new(&self.docker_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SupervisorError::Spawn {
                command: self.command_line(args),
                source,
            })
    }

    async fn docker_checked(&self, args: &[&str]) -> Result<Output, SupervisorError> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(SupervisorError::CommandFailed {
                command: self.command_line(args),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// `Some(running)` if the container exists.
    async fn inspect(&self) -> Result<Option<bool>, SupervisorError> {
        let output = self
            .docker(&["inspect", "-f", "{{.State.Running}}", &self.container])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim() == "true"))
    }

    async fn create(&self) -> Result<(), SupervisorError> {
        tracing::info!("Creating validator container {} from {}", self.container, self.image);
        self.docker_checked(&[
            "run",
            "--name",
            &self.container,
            "-d",
            "-v",
            "/test-ledger",
            "--init",
            "-p",
            "8899:8899/tcp",
            "-p",
            "8900:8900/tcp",
            "-p",
            "9900:9900/tcp",
            "-p",
            "10000:10000/tcp",
            "-p",
            "10000-10011:10000-10011/udp",
            "--log-driver",
            "local",
            "--ulimit",
            "nofile=1000000",
            &self.image,
            "solana-test-validator",
            "--ledger",
            "test-ledger",
            "--no-bpf-jit",
            "--log",
        ])
        .await?;
        Ok(())
    }

    /// Reads the validator output from `docker logs`, bounded by `MAX_LOG_BYTES`.
    async fn read_logs(&self, tail_lines: usize) -> Result<String, SupervisorError> {
        let tail = tail_lines.to_string();
        let args = ["logs", "--tail", tail.as_str(), self.container.as_str()];
        let spawn_error = |source| SupervisorError::Spawn {
            command: self.command_line(&args),
            source,
        };

        // the validator logs to stderr
        let mut child = Command::new(&self.docker_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let mut buf = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            stderr
                .take(MAX_LOG_BYTES)
                .read_to_end(&mut buf)
                .await
                .map_err(spawn_error)?;
        }
        let truncated = buf.len() as u64 >= MAX_LOG_BYTES;
        if truncated {
            tracing::warn!("Validator logs truncated at {} bytes", MAX_LOG_BYTES);
            let _ = child.start_kill();
        }
        let status = child.wait().await.map_err(spawn_error)?;
        let logs = String::from_utf8_lossy(&buf).into_owned();

        if !truncated && !status.success() {
            return Err(SupervisorError::CommandFailed {
                command: self.command_line(&args),
                status,
                stderr: logs.trim().to_string(),
            });
        }
        Ok(logs)
    }
}

/// Compiles a log filter. An empty pattern means no filter.
pub fn compile_filter(filter: Option<String>) -> Result<Option<Regex>, SupervisorError> {
    filter
        .filter(|f| !f.is_empty())
        .map(|pattern| {
            Regex::new(&pattern).map_err(|source| SupervisorError::InvalidFilter { pattern, source })
        })
        .transpose()
}

/// Keeps the last `max_lines` lines of `logs` matching `filter`, in their original order.
pub fn select_log_lines(logs: &str, filter: Option<&Regex>, max_lines: usize) -> String {
    let lines: Vec<&str> = logs
        .lines()
        .filter(|line| filter.map_or(true, |f| f.is_match(line)))
        .collect();
    lines[lines.len().saturating_sub(max_lines)..].join("\n")
}

#[async_trait::async_trait]
impl ValidatorSupervisor for DockerSupervisor {
    async fn probe_status(&self) -> NetStatus {
        match self.inspect().await {
            Ok(Some(true)) => NetStatus::Running,
            Ok(_) => NetStatus::Unavailable,
            Err(e) => {
                tracing::warn!("Failed to inspect validator container: {}", e);
                NetStatus::Unavailable
            }
        }
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        match self.inspect().await? {
            Some(true) => {
                tracing::info!("Validator container {} already running", self.container);
                Ok(())
            }
            Some(false) => {
                tracing::info!("Starting validator container {}", self.container);
                self.docker_checked(&["start", &self.container]).await?;
                Ok(())
            }
            None => self.create().await,
        }
    }

    async fn tail_logs(&self, filter: Option<String>) -> Result<String, SupervisorError> {
        match compile_filter(filter)? {
            Some(filter) => {
                let logs = self.read_logs(MAX_TAIL_LINES).await?;
                let matching = select_log_lines(&logs, Some(&filter), MAX_DISPLAY_LINES);
                tracing::info!(
                    "Filtered log lookup: {} bytes matched out of {}",
                    matching.len(),
                    logs.len()
                );
                Ok(matching)
            }
            None => {
                let logs = self.read_logs(MAX_DISPLAY_LINES).await?;
                Ok(select_log_lines(&logs, None, MAX_DISPLAY_LINES))
            }
        }
    }
}
