//! Configuration loading, layered in precedence order: a TOML file
//! supplies defaults, per-field `--flag` arguments override the file, and
//! `CODECRUCIBLE_*` environment variables override everything.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP job surface binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Tag applied to (and run from) the sandbox image.
    #[serde(default = "default_sandbox_image")]
    pub sandbox_image: String,

    /// Directory containing the `Dockerfile` used to build the sandbox image.
    #[serde(default = "default_build_context_dir")]
    pub build_context_dir: PathBuf,

    /// Number of worker-pool workers. Defaults to the host's CPU count.
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// Upper bound on a job's requested `max_execution_time_ms`, regardless
    /// of what the request asks for.
    #[serde(default = "default_max_execution_time_ceiling_ms")]
    pub max_execution_time_ceiling_ms: u64,

    /// Directory JSON logs are rotated into in `serve` mode.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            sandbox_image: default_sandbox_image(),
            build_context_dir: default_build_context_dir(),
            worker_count: None,
            max_execution_time_ceiling_ms: default_max_execution_time_ceiling_ms(),
            logs_dir: default_logs_dir(),
        }
    }
}

impl Config {
    /// Resolve the worker count, falling back to the host's CPU count.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus)
    }

    /// Clamp `requested_ms` to the configured ceiling. Treats `0` as
    /// "use the ceiling".
    #[must_use]
    pub fn clamp_execution_time_ms(&self, requested_ms: u64) -> u64 {
        clamp_execution_time_ms(self.max_execution_time_ceiling_ms, requested_ms)
    }

    /// Apply per-field CLI-flag overrides on top of a file- or
    /// default-sourced config. Each field is left untouched when its
    /// corresponding flag was not passed.
    #[must_use]
    pub fn with_cli_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(value) = &overrides.listen_address {
            self.listen_address = value.clone();
        }
        if let Some(value) = &overrides.sandbox_image {
            self.sandbox_image = value.clone();
        }
        if let Some(value) = &overrides.build_context_dir {
            self.build_context_dir = value.clone();
        }
        if let Some(value) = overrides.worker_count {
            self.worker_count = Some(value);
        }
        if let Some(value) = overrides.max_execution_time_ceiling_ms {
            self.max_execution_time_ceiling_ms = value;
        }
        self
    }

    /// Apply `CODECRUCIBLE_*` environment variable overrides on top of a
    /// file- or default-sourced config. Applied last, so these win over
    /// both the file and any CLI flag.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("CODECRUCIBLE_LISTEN_ADDRESS") {
            self.listen_address = value;
        }
        if let Ok(value) = std::env::var("CODECRUCIBLE_SANDBOX_IMAGE") {
            self.sandbox_image = value;
        }
        if let Ok(value) = std::env::var("CODECRUCIBLE_BUILD_CONTEXT_DIR") {
            self.build_context_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("CODECRUCIBLE_WORKER_COUNT") {
            if let Ok(count) = value.parse() {
                self.worker_count = Some(count);
            }
        }
        if let Ok(value) = std::env::var("CODECRUCIBLE_MAX_EXECUTION_TIME_CEILING_MS") {
            if let Ok(ceiling) = value.parse() {
                self.max_execution_time_ceiling_ms = ceiling;
            }
        }
        self
    }
}

/// Per-field overrides sourced from CLI flags. `None` means "flag not
/// passed, leave the file/default value alone."
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Overrides [`Config::listen_address`].
    pub listen_address: Option<String>,
    /// Overrides [`Config::sandbox_image`].
    pub sandbox_image: Option<String>,
    /// Overrides [`Config::build_context_dir`].
    pub build_context_dir: Option<PathBuf>,
    /// Overrides [`Config::worker_count`].
    pub worker_count: Option<usize>,
    /// Overrides [`Config::max_execution_time_ceiling_ms`].
    pub max_execution_time_ceiling_ms: Option<u64>,
}

fn default_listen_address() -> String {
    "127.0.0.1:50051".to_owned()
}

fn default_sandbox_image() -> String {
    "code-exec-sandbox:latest".to_owned()
}

fn default_build_context_dir() -> PathBuf {
    PathBuf::from("sandbox")
}

fn default_max_execution_time_ceiling_ms() -> u64 {
    600_000
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Clamp `requested_ms` to `ceiling_ms`. Treats `0` as "use the ceiling".
/// Free function so callers that only carry the ceiling value (not a full
/// [`Config`]), like [`crate::job::executor::JobExecutor`], can apply the
/// same rule without depending on the config type.
#[must_use]
pub fn clamp_execution_time_ms(ceiling_ms: u64, requested_ms: u64) -> u64 {
    if requested_ms == 0 || requested_ms > ceiling_ms {
        ceiling_ms
    } else {
        requested_ms
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Load config from a TOML file, then apply CLI-flag overrides, then
/// environment overrides, in that precedence order.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path, cli_overrides: &CliOverrides) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config.with_cli_overrides(cli_overrides).with_env_overrides())
}

/// Load config from `path` if it exists, otherwise fall back to defaults.
/// Either way, CLI-flag overrides apply on top, then environment
/// overrides apply last.
///
/// # Errors
///
/// Returns an error if `path` exists but cannot be read or parsed.
pub fn load_config_or_default(path: &Path, cli_overrides: &CliOverrides) -> anyhow::Result<Config> {
    if path.exists() {
        load_config(path, cli_overrides)
    } else {
        Ok(Config::default()
            .with_cli_overrides(cli_overrides)
            .with_env_overrides())
    }
}
