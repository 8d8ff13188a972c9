//! Process-wide configuration for the wrapper API.
//!
//! Everything is read from the environment exactly once at startup and
//! frozen into a [`Config`] that gets passed explicitly to the pieces that
//! need it. Nothing reads ambient global state after startup.

use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ALLOW_ORIGIN: &str = "*";
pub const DEFAULT_INFO_TIMEOUT_SECS: u64 = 30;

/// Immutable runtime configuration.
///
/// The optional fields map directly onto optional yt-dlp flags: when unset,
/// the flag is simply not passed and the tool falls back to its own
/// defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Value of the `Access-Control-Allow-Origin` header stamped on every
    /// response.
    pub allow_origin: String,
    /// Cookie jar forwarded to the tool via `--cookies`.
    pub cookies_file: Option<PathBuf>,
    /// Browser-like UA forwarded via `--user-agent`.
    pub user_agent: Option<String>,
    /// Adds `--no-check-certificates` to every invocation.
    pub no_check_certificate: bool,
    /// Upper bound on the blocking metadata probe. The streaming path is
    /// unbounded; it lives exactly as long as the response body.
    pub info_timeout: Duration,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same parsing, driven by an injected lookup so tests do not have to
    /// mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("HOST")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match lookup("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value {value:?}"))?,
            None => DEFAULT_PORT,
        };

        let allow_origin = lookup("ALLOW_ORIGIN")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOW_ORIGIN.to_string());

        let cookies_file = lookup("COOKIES_FILE")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let user_agent = lookup("USER_AGENT").filter(|value| !value.is_empty());

        let no_check_certificate = match lookup("NO_CHECK_CERTIFICATE") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("parsing NO_CHECK_CERTIFICATE value {value:?}"))?,
            None => false,
        };

        let info_timeout_secs = match lookup("INFO_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing INFO_TIMEOUT_SECS value {value:?}"))?,
            None => DEFAULT_INFO_TIMEOUT_SECS,
        };

        Ok(Self {
            host,
            port,
            allow_origin,
            cookies_file,
            user_agent,
            no_check_certificate,
            info_timeout: Duration::from_secs(info_timeout_secs),
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}
