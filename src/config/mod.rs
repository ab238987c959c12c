//! Engine configuration

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Connection and pagination settings, loaded from environment variables.
///
/// Configuration is passed explicitly to [`crate::driver::SqliteDriver::connect`]
/// and [`crate::client::Client::with_config`]; nothing reads it globally.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database URL, e.g. `sqlite://data/app.db` or `sqlite::memory:`
    pub database_url: String,

    /// Maximum pooled connections (forced to 1 for in-memory SQLite)
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// Per-statement timeout; `None` waits indefinitely
    pub statement_timeout: Option<Duration>,

    /// Page size used when a connection request gives neither `first` nor `last`
    pub default_page_size: i32,

    /// Upper bound applied to `first`/`last`
    pub max_page_size: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
            statement_timeout: None,
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, honoring a `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let statement_timeout = match env::var("ENTGRAPH_STATEMENT_TIMEOUT_MS") {
            Ok(ms) => Some(Duration::from_millis(
                ms.parse().context("Invalid ENTGRAPH_STATEMENT_TIMEOUT_MS")?,
            )),
            Err(_) => None,
        };

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),

            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", defaults.max_connections)?,

            acquire_timeout: Duration::from_secs(parse_var(
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),

            statement_timeout,

            default_page_size: parse_var("ENTGRAPH_PAGE_SIZE", defaults.default_page_size)?,

            max_page_size: parse_var("ENTGRAPH_MAX_PAGE_SIZE", defaults.max_page_size)?,
        };

        anyhow::ensure!(
            config.default_page_size > 0 && config.default_page_size <= config.max_page_size,
            "ENTGRAPH_PAGE_SIZE must be between 1 and ENTGRAPH_MAX_PAGE_SIZE"
        );

        Ok(config)
    }

    /// Whether the URL points at a private in-memory SQLite database.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
