//! Database connection configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration for the Postgres connection backing the audit and cache
/// tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL. Takes precedence over `url_env`.
    #[serde(default)]
    pub url: Option<String>,

    /// Environment variable holding the connection URL.
    #[serde(default = "default_url_env")]
    pub url_env: String,

    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait when acquiring a connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_env: default_url_env(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Resolve the connection URL from the inline value or the environment.
    pub fn resolve_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.clone());
        }

        std::env::var(&self.url_env).map_err(|_| {
            ConfigError::Config(format!(
                "no database url configured and environment variable {} is not set",
                self.url_env
            ))
        })
    }
}

fn default_url_env() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_url_wins() {
        let config = DatabaseConfig {
            url: Some("postgres://localhost/audit".to_string()),
            url_env: "FORMS_AUDIT_TEST_UNSET_VAR".to_string(),
            ..Default::default()
        };

        assert_eq!(config.resolve_url().unwrap(), "postgres://localhost/audit");
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let config = DatabaseConfig {
            url: None,
            url_env: "FORMS_AUDIT_TEST_UNSET_VAR".to_string(),
            ..Default::default()
        };

        assert!(matches!(config.resolve_url(), Err(ConfigError::Config(_))));
    }
}
