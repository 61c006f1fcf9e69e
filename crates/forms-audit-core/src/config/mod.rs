//! Configuration types for the forms audit service.
//!
//! Configuration is loaded from a single YAML file (`forms-audit.yaml` by
//! default). Every section is optional; omitted values fall back to the
//! defaults below.
//!
//! ```yaml
//! database:
//!   url_env: DATABASE_URL
//!   max_connections: 10
//! queue:
//!   receive_interval_ms: 30000
//!   max_messages: 10
//! cache:
//!   enabled: true
//! query:
//!   max_results: 100
//!   default_per_page: 25
//! ```

pub mod database;
pub mod queue;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::pagination::{DEFAULT_PER_PAGE, MAX_RESULTS, Pagination, PaginationError};
use crate::registry::ComparatorRegistry;

pub use database::DatabaseConfig;
pub use queue::{MAX_BATCH_SIZE, QueueConfig};

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditServiceConfig {
    /// Postgres connection.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Queue consumer settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Consolidated result cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query limits.
    #[serde(default)]
    pub query: QueryConfig,

    /// Replacement comparator registry. The forms default is used when unset.
    #[serde(default)]
    pub comparators: Option<ComparatorRegistry>,
}

/// Consolidated result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether consolidated results are cached.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Query limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard cap on page size.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Page size when none is requested.
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            default_per_page: default_per_page(),
        }
    }
}

impl QueryConfig {
    /// Build a page request honouring these limits.
    pub fn pagination(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Pagination, PaginationError> {
        Pagination::from_query(page, per_page, self.default_per_page, self.max_results)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> u32 {
    MAX_RESULTS
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuditServiceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise use defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.max_results == 0 {
            return Err(ConfigError::Config(
                "query.max_results must be at least 1".to_string(),
            ));
        }
        if self.query.default_per_page == 0 || self.query.default_per_page > self.query.max_results
        {
            return Err(ConfigError::Config(format!(
                "query.default_per_page must be between 1 and {}",
                self.query.max_results
            )));
        }
        if self.queue.max_messages == 0 || self.queue.max_messages > MAX_BATCH_SIZE {
            return Err(ConfigError::Config(format!(
                "queue.max_messages must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        Ok(())
    }

    /// The comparator registry in effect.
    pub fn comparator_registry(&self) -> ComparatorRegistry {
        self.comparators.clone().unwrap_or_default()
    }
}
