//! Configuration loading and validation for gemgate.
//!
//! All runtime settings come from the environment. One [`Config`] value is
//! built at startup and passed explicitly into the server, the account
//! store, and the rotation loop; nothing reads the environment after that.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed vendor endpoint for chat generation.
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://biz-discoveryengine.googleapis.com/v1alpha/locations/global/widgetStreamAssist";

/// Root configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (e.g., "0.0.0.0:8080").
    pub listen: String,
    /// Vendor endpoint URL.
    pub upstream_url: String,
    /// Path to the persisted account pool.
    pub accounts_file: PathBuf,
    /// Per-request deadline for the upstream call.
    pub request_timeout: Duration,
    /// Optional outbound HTTP proxy.
    pub proxy_url: Option<String>,
    /// Log outbound payloads and raw request bodies.
    pub debug: bool,
    /// Refuse to start when the pool holds no usable credential.
    pub require_credential: bool,
    /// Credential taken from the environment at startup, if any.
    pub seed: Option<SeedCredential>,
    pub rotation: RotationConfig,
}

/// A credential supplied via `BEARER_TOKEN` / `CONFIG_ID`, recorded onto
/// the pool before serving starts. Lets a single-account deployment run
/// without a harvester.
#[derive(Debug, Clone)]
pub struct SeedCredential {
    pub email: String,
    pub bearer_token: String,
    pub config_id: String,
}

/// Settings for the rotation loop.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Normal polling period.
    pub interval: Duration,
    /// Shortened wait after a failed cycle.
    pub retry_interval: Duration,
    /// Age of `last_used` beyond which the serving credential is considered
    /// stale and rotated out.
    pub token_max_age: Duration,
    /// Command invoked to make the chosen credential live. Rotation is not
    /// started when absent.
    pub deploy_command: Option<String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
}

fn invalid(var: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        message: message.into(),
    }
}

/// Read a value with a fallback default.
fn env_or<F>(lookup: &F, var: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read and parse a u64, failing loudly on malformed input rather than
/// silently falling back.
fn env_u64<F>(lookup: &F, var: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.is_empty() => value
            .parse::<u64>()
            .map_err(|e| invalid(var, format!("expected an integer: {}", e))),
        _ => Ok(default),
    }
}

fn env_bool<F>(lookup: &F, var: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.is_empty() => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{}'", other))),
        },
        _ => Ok(default),
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load configuration using a custom lookup function.
    ///
    /// The closure-based design makes this testable without touching global
    /// env state.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = env_u64(&lookup, "PORT", 8080)?;
        if port == 0 || port > u16::MAX as u64 {
            return Err(invalid("PORT", format!("port {} is out of range", port)));
        }
        let address = env_or(&lookup, "LISTEN_ADDRESS", "0.0.0.0");
        let listen = format!("{}:{}", address, port);
        listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| invalid("LISTEN_ADDRESS", e.to_string()))?;

        let request_timeout_secs = env_u64(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;

        let seed = match lookup("BEARER_TOKEN").filter(|t| !t.is_empty()) {
            Some(bearer_token) => {
                let config_id = lookup("CONFIG_ID").unwrap_or_default();
                if config_id.is_empty() {
                    return Err(invalid(
                        "CONFIG_ID",
                        "required when BEARER_TOKEN is set",
                    ));
                }
                Some(SeedCredential {
                    email: env_or(&lookup, "ACCOUNT_EMAIL", "env@local"),
                    bearer_token,
                    config_id,
                })
            }
            None => None,
        };

        let rotation = RotationConfig {
            interval: Duration::from_secs(env_u64(&lookup, "ROTATION_INTERVAL_SECS", 300)?),
            retry_interval: Duration::from_secs(env_u64(&lookup, "ROTATION_RETRY_SECS", 60)?),
            token_max_age: Duration::from_secs(env_u64(&lookup, "TOKEN_MAX_AGE_SECS", 3000)?),
            deploy_command: lookup("DEPLOY_COMMAND").filter(|c| !c.is_empty()),
        };
        if rotation.interval.is_zero() {
            return Err(invalid("ROTATION_INTERVAL_SECS", "must be greater than zero"));
        }
        if rotation.retry_interval.is_zero() {
            return Err(invalid("ROTATION_RETRY_SECS", "must be greater than zero"));
        }

        Ok(Config {
            listen,
            upstream_url: env_or(&lookup, "UPSTREAM_URL", DEFAULT_UPSTREAM_URL),
            accounts_file: PathBuf::from(env_or(&lookup, "ACCOUNTS_FILE", "accounts.json")),
            request_timeout: Duration::from_secs(request_timeout_secs),
            proxy_url: lookup("PROXY_URL").filter(|p| !p.is_empty()),
            debug: env_bool(&lookup, "DEBUG", false)?,
            require_credential: env_bool(&lookup, "REQUIRE_CREDENTIAL", true)?,
            seed,
            rotation,
        })
    }
}
