//! codecrucible — remote code-execution service.
//!
//! `serve` starts the HTTP job surface backed by a Docker sandbox pool.
//! `build-image` builds the sandbox image ahead of time, the same build
//! `serve` otherwise performs on startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use codecrucible::config::{self, CliOverrides, Config};
use codecrucible::container::{image, SandboxDriver};
use codecrucible::job::JobExecutor;
use codecrucible::rpc::{http, JobService};

/// Precedence, low to high: default < config file < these flags < `CODECRUCIBLE_*` env vars.
#[derive(Parser)]
#[command(name = "codecrucible", about = "Remote code-execution service")]
struct Cli {
    /// Path to a TOML config file. Missing file falls back to defaults.
    #[arg(long, global = true, default_value = "codecrucible.toml")]
    config: PathBuf,

    /// Overrides `Config::listen_address`.
    #[arg(long, global = true)]
    listen_address: Option<String>,

    /// Overrides `Config::sandbox_image`.
    #[arg(long, global = true)]
    sandbox_image: Option<String>,

    /// Overrides `Config::build_context_dir`.
    #[arg(long, global = true)]
    build_context_dir: Option<PathBuf>,

    /// Overrides `Config::worker_count`.
    #[arg(long, global = true)]
    worker_count: Option<usize>,

    /// Overrides `Config::max_execution_time_ceiling_ms`.
    #[arg(long, global = true)]
    max_execution_time_ceiling_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            listen_address: self.listen_address.clone(),
            sandbox_image: self.sandbox_image.clone(),
            build_context_dir: self.build_context_dir.clone(),
            worker_count: self.worker_count,
            max_execution_time_ceiling_ms: self.max_execution_time_ceiling_ms,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build the sandbox image and start serving jobs over HTTP.
    Serve,
    /// Build the sandbox image and exit.
    BuildImage,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let overrides = cli.overrides();
    let config = config::load_config_or_default(&cli.config, &overrides)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::BuildImage => build_image_only(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let _logging_guard = codecrucible::logging::init_server(&config.logs_dir)
        .context("failed to initialize logging")?;

    info!(listen_address = %config.listen_address, "starting codecrucible");

    let driver = Arc::new(SandboxDriver::connect().context("failed to connect to Docker daemon")?);

    info!(image = %config.sandbox_image, "building sandbox image");
    image::build_image(driver.docker(), &config.build_context_dir, &config.sandbox_image)
        .await
        .context("failed to build sandbox image")?;

    let executor = JobExecutor::new(
        Arc::clone(&driver),
        config.sandbox_image.clone(),
        config.max_execution_time_ceiling_ms,
    );
    let worker_count = config.resolved_worker_count();
    info!(worker_count, "starting worker pool");
    let service = Arc::new(JobService::new(executor, worker_count));

    let app = http::router(service);
    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;

    info!(listen_address = %config.listen_address, "codecrucible listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated with an error")?;

    Ok(())
}

async fn build_image_only(config: Config) -> Result<()> {
    codecrucible::logging::init_cli();

    let driver = SandboxDriver::connect().context("failed to connect to Docker daemon")?;
    info!(image = %config.sandbox_image, "building sandbox image");
    image::build_image(driver.docker(), &config.build_context_dir, &config.sandbox_image)
        .await
        .context("failed to build sandbox image")?;
    info!("build complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
