//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::HubConfig;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Default size of the PostgreSQL connection pool
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be parsed
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    /// A required variable is not set
    #[error("missing configuration: {0}")]
    Missing(&'static str),
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent viewer connections (0 = unlimited)
    pub max_connections: usize,

    /// PostgreSQL connection string
    pub database_url: Option<String>,

    /// Size of the PostgreSQL connection pool
    pub db_max_connections: u32,

    /// Settings applied to every hub
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_connections: 0, // Unlimited
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Load the configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    /// Variables already set in the environment take precedence over it.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// Recognized variables: `BIND_ADDR`, `DATABASE_URL` (or `PG_USERNAME`,
    /// `PG_PASSWORD`, `PG_DB_IP` and `PG_DB_NAME`), `MAX_CONNECTIONS`,
    /// `DB_MAX_CONNECTIONS`, `HUB_QUEUE_CAPACITY`, `PERSISTENCE_TIMEOUT_MS`
    /// (0 disables the bound) and `SEND_TIMEOUT_MS`. Unset variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse::<SocketAddr, _>(&lookup, "BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = parse::<usize, _>(&lookup, "MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(max) = parse::<u32, _>(&lookup, "DB_MAX_CONNECTIONS")? {
            config.db_max_connections = max.max(1);
        }

        config.database_url = database_url(&lookup);

        if let Some(capacity) = parse::<usize, _>(&lookup, "HUB_QUEUE_CAPACITY")? {
            config.hub = config.hub.queue_capacity(capacity);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "PERSISTENCE_TIMEOUT_MS")? {
            config.hub = if ms == 0 {
                config.hub.unbounded_persistence()
            } else {
                config.hub.persistence_timeout(Duration::from_millis(ms))
            };
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "SEND_TIMEOUT_MS")? {
            config.hub = config.hub.send_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the PostgreSQL connection string
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the hub configuration
    pub fn hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Get the connection string, failing if none is configured
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { name, value })
}

fn database_url<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
        return Some(url);
    }

    let host = lookup("PG_DB_IP")?;
    let name = lookup("PG_DB_NAME")?;
    let user = lookup("PG_USERNAME").unwrap_or_default();
    let password = lookup("PG_PASSWORD").unwrap_or_default();

    Some(format!(
        "postgresql://{user}:{password}@{host}/{name}?sslmode=disable"
    ))
}
