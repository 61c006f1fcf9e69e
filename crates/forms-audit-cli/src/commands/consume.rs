//! `consume`: run the queue consumer.

use forms_audit_service::{ConsolidatedCache, Consumer, IngestionPipeline, MessageMapper};
use forms_audit_store::{AuditStore, CacheStore, MessageQueue};
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: &Path, once: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = Arc::new(super::connect(&config).await?);

    let audit: Arc<dyn AuditStore> = store.clone();
    let cache_store: Arc<dyn CacheStore> = store.clone();
    let queue: Arc<dyn MessageQueue> = store.clone();

    let cache = Arc::new(ConsolidatedCache::new(cache_store, config.cache.enabled));
    let pipeline = Arc::new(IngestionPipeline::new(
        MessageMapper::new()?,
        audit,
        queue.clone(),
        cache,
    ));
    let consumer = Consumer::new(pipeline, queue, config.queue.clone());

    if once {
        let outcome = consumer.run_once().await.map_err(anyhow::Error::from);
        let outcome = super::close_after(&store, outcome).await?;
        for failed in &outcome.failed {
            eprintln!("✗ {}: {}", failed.message.display_id(), failed.error);
        }
        println!(
            "Processed {} messages: {} saved, {} failed",
            outcome.len(),
            outcome.saved.len(),
            outcome.failed.len()
        );
    } else {
        consumer.run(shutdown_signal()).await;
        store.close().await;
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
