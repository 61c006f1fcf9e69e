//! `events`: print an entity's audit trail.

use anyhow::Context;
use forms_audit_core::{AuditEventCategory, AuditFilter};
use forms_audit_service::{AuditService, ConsolidatedCache, ConsolidationEngine};
use forms_audit_store::{AuditStore, CacheStore};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct EventsArgs {
    pub entity_id: String,
    pub consolidated: bool,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn run(config_path: &Path, args: EventsArgs) -> anyhow::Result<()> {
    let mut filter = AuditFilter::entity(&args.entity_id);
    if let Some(category) = &args.category {
        filter = filter.with_category(parse_category(category)?);
    }

    let config = super::load_config(config_path)?;
    let store = Arc::new(super::connect(&config).await?);

    let audit: Arc<dyn AuditStore> = store.clone();
    let cache_store: Arc<dyn CacheStore> = store.clone();
    let engine = ConsolidationEngine::new(audit.clone(), config.comparator_registry());
    let cache = Arc::new(ConsolidatedCache::new(cache_store, config.cache.enabled));
    let service = AuditService::new(audit, engine, cache, config.query.clone());

    let output = render(&service, &filter, &args).await;
    let output = super::close_after(&store, output).await?;

    println!("{output}");
    Ok(())
}

async fn render(
    service: &AuditService,
    filter: &AuditFilter,
    args: &EventsArgs,
) -> anyhow::Result<String> {
    let pagination = service.pagination(args.page, args.per_page)?;
    let output = if args.consolidated {
        let result = service
            .read_consolidated_audit_events(filter, pagination)
            .await?;
        serde_json::to_string_pretty(&result)?
    } else {
        let result = service.read_audit_events(filter, pagination).await?;
        serde_json::to_string_pretty(&result)?
    };
    Ok(output)
}

/// Parse a category name, case-insensitively.
pub fn parse_category(value: &str) -> anyhow::Result<AuditEventCategory> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_uppercase()))
        .with_context(|| format!("Unknown audit event category '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("form").unwrap(), AuditEventCategory::Form);
        assert_eq!(
            parse_category("ENTITLEMENT").unwrap(),
            AuditEventCategory::Entitlement
        );
        assert!(parse_category("billing").is_err());
    }
}
