//! `migrate`: create the service's tables.

use std::path::Path;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = super::connect(&config).await?;

    let migrated = store.migrate().await.map_err(anyhow::Error::from);
    super::close_after(&store, migrated).await?;

    println!("Database schema is up to date");
    Ok(())
}
