//! CLI flags and environment fallback for the relay.
//!
//! Each flag falls back to an env var, matching the shape the original
//! `Config::from_env` used for the proxy this was adapted from; `clap`'s
//! `env` feature gives us that for free except for the master key, which
//! needs a base64-decode-and-length-check pass after parsing.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Parser;

use crate::secret::MASTER_KEY_LEN;

#[derive(Debug, Parser)]
#[command(name = "registration-relay", about = "Provider registration relay")]
pub struct Args {
    /// HTTP listen address.
    #[arg(long, env = "REGISTRATION_RELAY_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: String,

    /// Metrics listen address (separate port from the main API).
    #[arg(long, env = "REGISTRATION_RELAY_METRICS_LISTEN", default_value = "0.0.0.0:5000")]
    pub metrics_listen: String,

    /// Base64-standard-encoded 32-byte master key. Required.
    #[arg(long, env = "REGISTRATION_RELAY_SECRET")]
    pub secret: String,

    /// Optional external URL the auth middleware calls to validate
    /// `X-Beeper-Access-Token`. Auth middleware is disabled if unset.
    #[arg(long, env = "REGISTRATION_RELAY_VALIDATE_AUTH_URL")]
    pub validate_auth_url: Option<String>,

    /// Human-readable (as opposed to JSON) log formatting.
    #[arg(long, env = "REGISTRATION_RELAY_PRETTY_LOGS")]
    pub pretty_logs: bool,

    /// Verbose (debug-level) logging.
    #[arg(long, env = "REGISTRATION_RELAY_DEBUG")]
    pub debug: bool,
}

/// Fully-validated configuration. Construction is the only place the master
/// key's shape is checked; every other component just takes `[u8; 32]`.
pub struct Config {
    pub listen: String,
    pub metrics_listen: String,
    pub master_key: [u8; MASTER_KEY_LEN],
    pub validate_auth_url: Option<String>,
    pub pretty_logs: bool,
    pub debug: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        let key_bytes = STANDARD
            .decode(args.secret.trim())
            .context("REGISTRATION_RELAY_SECRET is not valid base64")?;
        let master_key: [u8; MASTER_KEY_LEN] = key_bytes.try_into().map_err(|bad: Vec<u8>| {
            anyhow::anyhow!(
                "REGISTRATION_RELAY_SECRET must decode to {} bytes, got {}",
                MASTER_KEY_LEN,
                bad.len()
            )
        })?;

        Ok(Self {
            listen: args.listen,
            metrics_listen: args.metrics_listen,
            master_key,
            validate_auth_url: args.validate_auth_url,
            pretty_logs: args.pretty_logs,
            debug: args.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_secret(secret: &str) -> Args {
        Args {
            listen: "0.0.0.0:8000".into(),
            metrics_listen: "0.0.0.0:5000".into(),
            secret: secret.into(),
            validate_auth_url: None,
            pretty_logs: false,
            debug: false,
        }
    }

    #[test]
    fn accepts_32_byte_key() {
        let secret = STANDARD.encode([0u8; 32]);
        let config = Config::from_args(args_with_secret(&secret)).unwrap();
        assert_eq!(config.master_key, [0u8; 32]);
    }

    #[test]
    fn rejects_wrong_length_key() {
        let secret = STANDARD.encode([0u8; 16]);
        assert!(Config::from_args(args_with_secret(&secret)).is_err());
    }

    #[test]
    fn rejects_non_base64_key() {
        assert!(Config::from_args(args_with_secret("not base64!!")).is_err());
    }
}
