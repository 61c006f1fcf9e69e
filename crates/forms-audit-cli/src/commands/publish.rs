//! `publish`: enqueue audit message bodies from files.

use anyhow::Context;
use forms_audit_service::MessageMapper;
use forms_audit_store::MessageQueue;
use std::fs;
use std::path::{Path, PathBuf};

pub async fn run(config_path: &Path, files: &[PathBuf], skip_validation: bool) -> anyhow::Result<()> {
    let mapper = MessageMapper::new()?;

    let mut bodies = Vec::with_capacity(files.len());
    for file in files {
        let body = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        if !skip_validation {
            mapper
                .parse_body(&body)
                .with_context(|| format!("{} is not a valid audit message", file.display()))?;
        }
        bodies.push((file, body));
    }

    let config = super::load_config(config_path)?;
    let store = super::connect(&config).await?;

    let mut sent = Ok(());
    for (file, body) in &bodies {
        match store.send(body).await {
            Ok(id) => println!("✓ {} -> {}", file.display(), id),
            Err(e) => {
                sent = Err(e).with_context(|| format!("Failed to enqueue {}", file.display()));
                break;
            }
        }
    }

    super::close_after(&store, sent).await
}
