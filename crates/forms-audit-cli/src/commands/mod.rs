//! CLI command implementations for the forms audit service.

pub mod consume;
pub mod events;
pub mod migrate;
pub mod publish;
pub mod validate;

use anyhow::Context;
use forms_audit_core::AuditServiceConfig;
use forms_audit_store::PgStore;
use std::path::Path;

/// Load the configuration file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> anyhow::Result<AuditServiceConfig> {
    AuditServiceConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Open the Postgres pool described by `config`.
pub async fn connect(config: &AuditServiceConfig) -> anyhow::Result<PgStore> {
    let url = config.database.resolve_url()?;
    let store = PgStore::connect(&url, &config.database)
        .await
        .context("Failed to connect to database")?;
    Ok(store)
}

/// Close the pool, then hand back `result`.
pub async fn close_after<T>(store: &PgStore, result: anyhow::Result<T>) -> anyhow::Result<T> {
    store.close().await;
    result
}
