//! Environment-driven gateway configuration
//!
//! The gateway is configured entirely through environment variables so it
//! can run under systemd, containers, or a bare shell without a config
//! file. Every knob has a default suitable for a single-host install.

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default listen port
const DEFAULT_PORT: u16 = 3000;

/// Default classifier endpoint (local Ollama-compatible server)
const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:11434/v1";

/// Default classifier model name
const DEFAULT_CLASSIFIER_MODEL: &str = "llama3.2:3b";

/// Default health-probe interval in milliseconds
const DEFAULT_PROBE_INTERVAL_MS: u64 = 60_000;

/// Minimum accepted health-probe interval
const MIN_PROBE_INTERVAL_MS: u64 = 1_000;

/// Default Anthropic API version header value
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Resolved gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// TCP port the gateway listens on
    pub port: u16,
    /// Path to the SQLite registry database
    pub db_path: PathBuf,
    /// Base URL of the Tier-2 classifier endpoint
    pub classifier_url: Url,
    /// Model name sent to the classifier endpoint
    pub classifier_model: String,
    /// Interval between health-probe rounds
    pub probe_interval_ms: u64,
    /// Optional bearer key required on all endpoints except liveness
    pub api_key: Option<SecretString>,
    /// Value for the `anthropic-version` header on Anthropic backends
    pub anthropic_version: String,
}

impl GatewayConfig {
    /// Read configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a set variable fails to parse
    /// or falls outside its accepted range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("CROSSBAR_PORT") {
            Ok(raw) => {
                let port: u16 = raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "CROSSBAR_PORT",
                    reason: format!("`{raw}` is not a port number"),
                })?;
                if port == 0 {
                    return Err(ConfigError::Invalid {
                        var: "CROSSBAR_PORT",
                        reason: "port must be between 1 and 65535".to_owned(),
                    });
                }
                port
            }
            Err(_) => DEFAULT_PORT,
        };

        let db_path = std::env::var("CROSSBAR_DB_PATH")
            .map_or_else(|_| default_db_path(), |raw| expand_home(&raw));

        let classifier_url = match std::env::var("CROSSBAR_CLASSIFIER_URL") {
            Ok(raw) => Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                var: "CROSSBAR_CLASSIFIER_URL",
                reason: e.to_string(),
            })?,
            Err(_) => Url::parse(DEFAULT_CLASSIFIER_URL).expect("valid default URL"),
        };

        let classifier_model = std::env::var("CROSSBAR_CLASSIFIER_MODEL")
            .unwrap_or_else(|_| DEFAULT_CLASSIFIER_MODEL.to_owned());

        let probe_interval_ms = match std::env::var("CROSSBAR_PROBE_INTERVAL_MS") {
            Ok(raw) => {
                let interval: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "CROSSBAR_PROBE_INTERVAL_MS",
                    reason: format!("`{raw}` is not a millisecond count"),
                })?;
                if interval < MIN_PROBE_INTERVAL_MS {
                    return Err(ConfigError::Invalid {
                        var: "CROSSBAR_PROBE_INTERVAL_MS",
                        reason: format!("interval must be at least {MIN_PROBE_INTERVAL_MS} ms"),
                    });
                }
                interval
            }
            Err(_) => DEFAULT_PROBE_INTERVAL_MS,
        };

        let api_key = std::env::var("CROSSBAR_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let anthropic_version = std::env::var("CROSSBAR_ANTHROPIC_VERSION")
            .unwrap_or_else(|_| DEFAULT_ANTHROPIC_VERSION.to_owned());

        Ok(Self {
            port,
            db_path,
            classifier_url,
            classifier_model,
            probe_interval_ms,
            api_key,
            anthropic_version,
        })
    }
}

/// Default database location under the user's home directory
fn default_db_path() -> PathBuf {
    expand_home("~/.crossbar/router/router.db")
}

/// Expand a leading `~` to the user's home directory
fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(raw)
}
