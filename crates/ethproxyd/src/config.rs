//! Daemon settings.
//!
//! Values come from, in order of precedence: command-line flags, the
//! environment (including a `.env` file), the optional TOML config file,
//! and finally built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};

use ethproxy_pool::PoolConfig;
use ethproxy_types::{ProxyFileConfig, parse_duration};

#[derive(Parser, Debug)]
#[command(
    name = "ethproxyd",
    version,
    about = "Ethereum balance proxy over a pool of upstream nodes"
)]
pub struct Cli {
    /// Port to listen on [default: 8080].
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Per-request deadline, e.g. "5s" or "500ms" [default: 5s].
    #[arg(long, env = "TIMEOUT_LIMIT")]
    pub timeout_limit: Option<String>,

    /// Default tracing filter when RUST_LOG is unset [default: info].
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format [default: json].
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Comma-separated upstream JSON-RPC URLs.
    #[arg(long, env = "CLIENT_URLS", value_delimiter = ',')]
    pub client_urls: Vec<String>,

    /// How often unhealthy endpoints are re-probed [default: 10s].
    #[arg(long, env = "PROBE_INTERVAL")]
    pub probe_interval: Option<String>,

    /// Deadline for each upstream attempt; must be below the timeout limit [default: 2s].
    #[arg(long, env = "QUERY_TIMEOUT")]
    pub query_timeout: Option<String>,

    /// Run a background consensus round at this interval [default: off].
    #[arg(long, env = "CONSENSUS_INTERVAL")]
    pub consensus_interval: Option<String>,

    /// Optional TOML file supplying values not given above.
    #[arg(long, env = "ETHPROXY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub request_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    pub client_urls: Vec<String>,
    pub pool: PoolConfig,
}

impl Settings {
    /// Load the config file named by `cli` (if any) and resolve.
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => ProxyFileConfig::from_file(path)
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => ProxyFileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    pub fn resolve(cli: Cli, file: ProxyFileConfig) -> anyhow::Result<Self> {
        let defaults = PoolConfig::default();

        let port = cli.port.or(file.port).unwrap_or(8080);
        let request_timeout = duration_setting(
            "timeout limit",
            cli.timeout_limit.or(file.timeout_limit),
            Duration::from_secs(5),
        )?;
        let log_level = cli
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| "info".to_string());
        let log_format = match (cli.log_format, file.log_format) {
            (Some(format), _) => format,
            (None, Some(raw)) => LogFormat::from_str(&raw, true)
                .map_err(|_| anyhow::anyhow!("invalid log format {raw:?}, expected json or pretty"))?,
            (None, None) => LogFormat::default(),
        };

        let client_urls: Vec<String> = if cli.client_urls.is_empty() {
            file.client_urls.unwrap_or_default()
        } else {
            cli.client_urls
        }
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();
        if client_urls.is_empty() {
            bail!("no upstream endpoints configured, set CLIENT_URLS");
        }

        let probe_interval = duration_setting(
            "probe interval",
            cli.probe_interval.or(file.probe_interval),
            defaults.probe_interval,
        )?;
        let query_timeout = duration_setting(
            "query timeout",
            cli.query_timeout.or(file.query_timeout),
            defaults.query_timeout,
        )?;
        let consensus_interval = ProxyFileConfig::duration(
            cli.consensus_interval
                .or(file.consensus_interval)
                .as_deref(),
        )
        .context("invalid consensus interval")?;

        if probe_interval.is_zero() || consensus_interval.is_some_and(|d| d.is_zero()) {
            bail!("background intervals must be greater than zero");
        }
        if query_timeout.is_zero() {
            bail!("query timeout must be greater than zero");
        }
        // Upstream attempts must time out inside the request deadline.
        if query_timeout >= request_timeout {
            bail!(
                "query timeout ({query_timeout:?}) must be shorter than the timeout limit ({request_timeout:?})"
            );
        }

        Ok(Self {
            port,
            request_timeout,
            log_level,
            log_format,
            client_urls,
            pool: PoolConfig {
                probe_interval,
                query_timeout,
                consensus_interval,
                ..defaults
            },
        })
    }
}

fn duration_setting(
    name: &str,
    raw: Option<String>,
    default: Duration,
) -> anyhow::Result<Duration> {
    match raw {
        None => Ok(default),
        Some(raw) => parse_duration(&raw)
            .with_context(|| format!("invalid {name} {raw:?}, expected e.g. \"5s\" or \"500ms\"")),
    }
}
