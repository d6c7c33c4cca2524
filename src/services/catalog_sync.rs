//! Catalog synchronization.
//!
//! Upserts enriched feed records into the persistent threat catalog. Records
//! a human has edited keep their edits unless the caller forces the update;
//! records already matching the feed are left untouched so repeated syncs
//! are no-ops.

use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::entities::catalog::{
    ThreatCatalogEntry, apply_feed_update, catalog_entry_by_technique_id, insert_catalog_entry,
};
use crate::enrichment::enricher::EnrichedTechnique;
use crate::error::Result;
use crate::storage::db::DatabaseManager;

/// Source tag stamped on every record the sync writes.
pub const FEED_SOURCE: &str = "external-feed";

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Overwrite records even when a human has edited them.
    pub force_update: bool,
    /// Feed version recorded on created and updated entries.
    pub source_version: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// How a single feed record was resolved against the stored catalog.
enum RecordOutcome {
    Created,
    Updated,
    Skipped,
}

pub struct CatalogSyncService {
    db: DatabaseManager,
    write_lock: Mutex<()>,
}

impl CatalogSyncService {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Upsert a batch of enriched feed records. Each record commits in its
    /// own transaction; a record that fails to persist is rolled back,
    /// logged and counted as skipped, and the rest of the batch still runs.
    #[instrument(skip(self, records))]
    pub async fn sync_catalog(
        &self,
        records: &[EnrichedTechnique],
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let _guard = self.write_lock.lock().await;
        let mut report = SyncReport::default();

        for record in records {
            if record.technique_id.is_empty() {
                warn!("Skipping feed record '{}' without technique id", record.name);
                report.skipped += 1;
                continue;
            }

            match self.sync_record(record, options).await {
                Ok(RecordOutcome::Created) => report.created += 1,
                Ok(RecordOutcome::Updated) => report.updated += 1,
                Ok(RecordOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        "Failed to sync feed record '{}', continuing with batch: {e}",
                        record.technique_id
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(
            "Catalog sync finished: {} created, {} updated, {} skipped",
            report.created, report.updated, report.skipped
        );
        Ok(report)
    }

    /// Upsert one record inside its own transaction. Returning an error
    /// drops the transaction, which rolls the record back.
    async fn sync_record(
        &self,
        record: &EnrichedTechnique,
        options: &SyncOptions,
    ) -> Result<RecordOutcome> {
        let incoming = entry_from_record(record, options.source_version.as_deref());
        let mut tx = self.db.pool.begin().await?;
        let outcome = match catalog_entry_by_technique_id(&mut tx, &record.technique_id).await? {
            None => {
                insert_catalog_entry(&mut tx, &incoming).await?;
                RecordOutcome::Created
            }
            Some(existing) if existing.user_modified && !options.force_update => {
                debug!(
                    "Preserving user-modified catalog entry {}",
                    existing.technique_id
                );
                RecordOutcome::Skipped
            }
            Some(existing) => {
                if feed_fields_differ(&existing, &incoming) {
                    apply_feed_update(&mut tx, &existing.id, &incoming).await?;
                    RecordOutcome::Updated
                } else {
                    RecordOutcome::Skipped
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }
}

fn entry_from_record(
    record: &EnrichedTechnique,
    source_version: Option<&str>,
) -> ThreatCatalogEntry {
    let now = Utc::now();
    ThreatCatalogEntry {
        id: Uuid::new_v4(),
        technique_id: record.technique_id.clone(),
        name: record.name.clone(),
        description: record.description.clone(),
        category: record.category,
        component_types: Json(record.component_types.clone()),
        trust_zones: Json(record.trust_zones.clone()),
        attack_vectors: Json(record.attack_vectors.clone()),
        likelihood: record.likelihood,
        severity: record.severity,
        mitigations: Json(record.mitigations.clone()),
        cross_refs: Json(record.cross_refs.clone()),
        examples: record.examples.clone(),
        relevance: record.relevance,
        source: FEED_SOURCE.to_string(),
        source_version: source_version.map(str::to_string),
        user_modified: false,
        created_at: now,
        updated_at: now,
    }
}

/// Whether any feed-owned field changed. Identity, the user-modified flag
/// and timestamps are deliberately not compared.
fn feed_fields_differ(existing: &ThreatCatalogEntry, incoming: &ThreatCatalogEntry) -> bool {
    existing.name != incoming.name
        || existing.description != incoming.description
        || existing.category != incoming.category
        || existing.component_types.0 != incoming.component_types.0
        || existing.trust_zones.0 != incoming.trust_zones.0
        || existing.attack_vectors.0 != incoming.attack_vectors.0
        || existing.likelihood != incoming.likelihood
        || existing.severity != incoming.severity
        || existing.mitigations.0 != incoming.mitigations.0
        || existing.cross_refs.0 != incoming.cross_refs.0
        || existing.examples != incoming.examples
        || existing.relevance != incoming.relevance
        || existing.source != incoming.source
        || existing.source_version != incoming.source_version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::catalog::{ComponentType, ThreatCategory, TrustZone};

    fn feed_record(technique_id: &str, name: &str) -> EnrichedTechnique {
        EnrichedTechnique {
            technique_id: technique_id.to_string(),
            name: name.to_string(),
            description: format!("Description of {name}"),
            category: ThreatCategory::Tampering,
            component_types: vec![ComponentType::Controller],
            trust_zones: vec![TrustZone::Trusted],
            attack_vectors: vec![],
            likelihood: 3,
            severity: 4,
            mitigations: vec!["Sign firmware images".to_string()],
            cross_refs: vec![],
            examples: None,
            relevance: 3,
        }
    }

    #[tokio::test]
    async fn test_sync_creates_then_repeats_as_noop() {
        let db = DatabaseManager::setup_test_db().await;
        let service = CatalogSyncService::new(db.clone());
        let records = vec![
            feed_record("T0001", "Firmware tampering"),
            feed_record("T0002", "Bus injection"),
        ];

        let first = service
            .sync_catalog(&records, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(first.created, 2);
        assert_eq!(first.updated, 0);
        assert_eq!(first.skipped, 0);
        assert_eq!(db.count_catalog_entries().await.expect("Failed to count"), 2);

        let second = service
            .sync_catalog(&records, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.count_catalog_entries().await.expect("Failed to count"), 2);
    }

    #[tokio::test]
    async fn test_sync_updates_changed_records() {
        let db = DatabaseManager::setup_test_db().await;
        let service = CatalogSyncService::new(db.clone());
        let records = vec![feed_record("T0001", "Firmware tampering")];
        service
            .sync_catalog(&records, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        let original = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");

        let mut changed = records.clone();
        changed[0].likelihood = 5;
        changed[0].description = "Rewritten description".to_string();
        let report = service
            .sync_catalog(&changed, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(report.updated, 1);

        let refreshed = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");
        assert_eq!(refreshed.likelihood, 5);
        assert_eq!(refreshed.description, "Rewritten description");
        assert_eq!(refreshed.id, original.id);
        assert_eq!(refreshed.created_at, original.created_at);
        assert!(!refreshed.user_modified);
    }

    #[tokio::test]
    async fn test_sync_preserves_user_edits() {
        let db = DatabaseManager::setup_test_db().await;
        let service = CatalogSyncService::new(db.clone());
        service
            .sync_catalog(&[feed_record("T0001", "Firmware tampering")], &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");

        let mut edited = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");
        edited.name = "Curated name".to_string();
        edited.severity = 5;
        db.update_catalog_entry(&edited)
            .await
            .expect("Failed to update entry");

        let report = service
            .sync_catalog(&[feed_record("T0001", "Feed name v2")], &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 0);

        let preserved = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");
        assert_eq!(preserved.name, "Curated name");
        assert_eq!(preserved.severity, 5);
        assert!(preserved.user_modified);
    }

    #[tokio::test]
    async fn test_forced_sync_overwrites_user_edits() {
        let db = DatabaseManager::setup_test_db().await;
        let service = CatalogSyncService::new(db.clone());
        service
            .sync_catalog(&[feed_record("T0001", "Firmware tampering")], &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");

        let mut edited = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");
        edited.name = "Curated name".to_string();
        db.update_catalog_entry(&edited)
            .await
            .expect("Failed to update entry");

        let options = SyncOptions {
            force_update: true,
            source_version: Some("2025.2".to_string()),
        };
        let report = service
            .sync_catalog(&[feed_record("T0001", "Feed name v2")], &options)
            .await
            .expect("Failed to sync catalog");
        assert_eq!(report.updated, 1);

        let overwritten = db
            .get_catalog_entry_by_technique_id("T0001")
            .await
            .expect("Failed to fetch entry")
            .expect("Entry not found");
        assert_eq!(overwritten.name, "Feed name v2");
        assert_eq!(overwritten.source_version.as_deref(), Some("2025.2"));
        assert_eq!(overwritten.created_at, edited.created_at);
        // The flag keeps recording that a human touched the entry
        assert!(overwritten.user_modified);
    }

    #[tokio::test]
    async fn test_sync_skips_records_without_identifier() {
        let db = DatabaseManager::setup_test_db().await;
        let service = CatalogSyncService::new(db.clone());
        let records = vec![feed_record("", "Nameless"), feed_record("T0002", "Bus injection")];

        let report = service
            .sync_catalog(&records, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(db.count_catalog_entries().await.expect("Failed to count"), 1);
    }

    #[tokio::test]
    async fn test_sync_outlives_record_persistence_fault() {
        let db = DatabaseManager::setup_test_db().await;
        // Reject one technique at the storage layer so the batch has to
        // sync around a failing record.
        sqlx::query(
            "CREATE TRIGGER reject_t0002 BEFORE INSERT ON threat_catalog
             WHEN NEW.technique_id = 'T0002'
             BEGIN SELECT RAISE(ABORT, 'catalog write rejected'); END",
        )
        .execute(&db.pool)
        .await
        .expect("Failed to create trigger");

        let service = CatalogSyncService::new(db.clone());
        let records = vec![
            feed_record("T0001", "Firmware tampering"),
            feed_record("T0002", "Bus injection"),
            feed_record("T0003", "Diagnostic session abuse"),
        ];
        let report = service
            .sync_catalog(&records, &SyncOptions::default())
            .await
            .expect("Failed to sync catalog");
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);

        // The record behind the fault still synced, the faulting one
        // left no partial row behind.
        assert!(
            db.get_catalog_entry_by_technique_id("T0003")
                .await
                .expect("Failed to fetch entry")
                .is_some()
        );
        assert!(
            db.get_catalog_entry_by_technique_id("T0002")
                .await
                .expect("Failed to fetch entry")
                .is_none()
        );
        assert_eq!(db.count_catalog_entries().await.expect("Failed to count"), 2);
    }
}
