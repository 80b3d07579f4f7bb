use anyhow::{Context, Result};
use clap::Parser;
use solana_workbench::application::app::App;
use solana_workbench::config::{self, WorkbenchConfig};
use solana_workbench::infrastructure::logging;
use solana_workbench::infrastructure::shutdown::ShutdownChannel;
use solana_workbench::service;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Solana Workbench backend: account registry, key custody and local validator control"
)]
struct WorkbenchProgram {
    /// Directory holding keys, logs and the account database [default: ~/.solana-workbench]
    #[arg(short, long)]
    workbench_dir: Option<PathBuf>,

    /// Listen port of the IPC endpoint
    #[arg(short, long, default_value_t = 3000)]
    listen_port: u16,

    /// Docker executable used to run the local validator
    #[arg(long)]
    docker_path: Option<PathBuf>,

    /// Validator container image
    #[arg(long)]
    docker_image: Option<String>,

    /// Anchor executable used to fetch program IDLs
    #[arg(long, default_value = config::DEFAULT_ANCHOR_PATH)]
    anchor_path: PathBuf,

    /// Seconds to wait for a transaction to be finalized
    #[arg(long, default_value_t = 60)]
    confirm_timeout_secs: u64,
}

impl WorkbenchProgram {
    fn into_config(self) -> Result<WorkbenchConfig> {
        let workbench_dir = match self.workbench_dir {
            Some(dir) => dir,
            None => config::default_workbench_dir()
                .context("cannot locate the home directory, pass --workbench-dir")?,
        };
        Ok(WorkbenchConfig::builder()
            .workbench_dir(workbench_dir)
            .docker_path(self.docker_path.unwrap_or_else(config::default_docker_path))
            .docker_image(
                self.docker_image
                    .unwrap_or_else(|| config::default_docker_image().to_string()),
            )
            .anchor_path(self.anchor_path)
            .confirm_timeout(Duration::from_secs(self.confirm_timeout_secs))
            .build())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkbenchProgram::parse();
    let listen_port = args.listen_port;
    let config = args.into_config()?;
    config
        .prepare_dirs()
        .with_context(|| format!("cannot create {}", config.workbench_dir.display()))?;

    // Initialize logging
    let log_guard = logging::init(&config.log_dir()).context("cannot initialize logging")?;
    tracing::info!(
        "Workbench session begin: version {}, workdir {}, log {}",
        env!("CARGO_PKG_VERSION"),
        std::env::current_dir()?.display(),
        log_guard.path().display()
    );

    let app = Arc::new(App::open(&config).context("cannot open workbench state")?);

    // Create a shutdown channel
    let shutdown = ShutdownChannel::default();

    // Start the IPC server
    let server_handle = tokio::spawn(service::api::start_server(
        shutdown.clone(),
        app,
        listen_port,
    ));

    // Wait for shutdown signal
    signal::ctrl_c().await?;
    tracing::warn!("Received Ctrl+C, shutting down...");
    shutdown.trigger();

    match server_handle.await {
        Ok(Err(e)) => tracing::error!("IPC server error: {:?}", e),
        Err(e) => tracing::error!("IPC server task failed: {:?}", e),
        Ok(Ok(())) => {}
    }

    tracing::info!("Shutdown complete");
    drop(log_guard);
    Ok(())
}
