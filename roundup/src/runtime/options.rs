//! Service configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use roundup_shared::constants::{envs, network};
use roundup_shared::{RoundupError, RoundupResult};

/// Default cap on request bodies. Load tests post 100k transactions.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Default time finished jobs stay queryable.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Options for the HTTP service.
///
/// Resolution order: built-in defaults, then `ROUNDUP_*` environment
/// variables ([`ServerOptions::from_env`]), then command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub host: IpAddr,
    pub port: u16,
    /// Route prefix of the savings API, always starting with `/`.
    pub api_prefix: String,
    pub max_body_bytes: usize,
    pub job_retention: Duration,
    /// When set, logs are also written to daily files in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: network::DEFAULT_HOST
                .parse()
                .unwrap_or(IpAddr::from([0, 0, 0, 0])),
            port: network::DEFAULT_PORT,
            api_prefix: network::DEFAULT_API_PREFIX.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            job_retention: DEFAULT_JOB_RETENTION,
            log_dir: None,
        }
    }
}

impl ServerOptions {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> RoundupResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> RoundupResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(host) = lookup(envs::HOST) {
            options.host = parse_value(envs::HOST, &host)?;
        }
        if let Some(port) = lookup(envs::PORT) {
            options.port = parse_value(envs::PORT, &port)?;
        }
        if let Some(prefix) = lookup(envs::API_PREFIX) {
            options.api_prefix = prefix;
        }
        if let Some(limit) = lookup(envs::MAX_BODY_BYTES) {
            options.max_body_bytes = parse_value(envs::MAX_BODY_BYTES, &limit)?;
        }
        if let Some(secs) = lookup(envs::JOB_RETENTION_SECS) {
            options.job_retention = Duration::from_secs(parse_value(envs::JOB_RETENTION_SECS, &secs)?);
        }
        if let Some(dir) = lookup(envs::LOG_DIR) {
            options.log_dir = Some(PathBuf::from(dir));
        }

        options.sanitize()?;
        Ok(options)
    }

    /// Normalize and validate. The prefix gains a leading `/` and loses any
    /// trailing one; an empty prefix mounts the API at the root.
    pub fn sanitize(&mut self) -> RoundupResult<()> {
        let trimmed = self.api_prefix.trim().trim_end_matches('/');
        self.api_prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };

        if self.max_body_bytes == 0 {
            return Err(RoundupError::Config(
                "max body size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> RoundupResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RoundupError::Config(format!("invalid {key}={raw:?}: {e}")))
}
