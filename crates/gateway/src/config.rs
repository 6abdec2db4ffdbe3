// Gateway server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_POOL_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core gateway configuration.
///
/// Constructed via [`GatewayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `docgate=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
    pub backend: BackendOptions,
}

/// Settings applied to every backend connection opened by the registry.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Upper bound for a single backend call (find, insert, ping, ...).
    pub operation_timeout: Duration,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DOCGATE_HOST` | `0.0.0.0` |
    /// | `DOCGATE_PORT` | `8080` |
    /// | `DOCGATE_CORS_ORIGINS` | *(none; cors.rs uses dev defaults)* |
    /// | `DOCGATE_LOG_FILTER` | `info` |
    /// | `DOCGATE_LOG_FORMAT` | `text` (`json` for structured output) |
    /// | `DOCGATE_BACKEND_TIMEOUT_MS` | `10000` |
    /// | `DOCGATE_POOL_MAX_CONNECTIONS` | `10` |
    /// | `DOCGATE_POOL_ACQUIRE_TIMEOUT_SECS` | `5` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("DOCGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_or(&env, "DOCGATE_PORT", DEFAULT_PORT);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let cors_origins = env("DOCGATE_CORS_ORIGINS").ok();
        let log_filter = env("DOCGATE_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("DOCGATE_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let backend = BackendOptions {
            operation_timeout: Duration::from_millis(parse_or(
                &env,
                "DOCGATE_BACKEND_TIMEOUT_MS",
                DEFAULT_BACKEND_TIMEOUT_MS,
            )),
            max_connections: parse_or(
                &env,
                "DOCGATE_POOL_MAX_CONNECTIONS",
                DEFAULT_POOL_MAX_CONNECTIONS,
            ),
            acquire_timeout: Duration::from_secs(parse_or(
                &env,
                "DOCGATE_POOL_ACQUIRE_TIMEOUT_SECS",
                DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS,
            )),
        };

        Self { listen_addr, cors_origins, log_filter, log_format, backend }
    }
}

fn parse_or<F, T>(env: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
{
    env(key).ok().and_then(|value| value.parse().ok()).unwrap_or(default)
}
