use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::assets::CiaDimension;
use crate::error::{AppError, Result};
use crate::storage::db::DatabaseManager;
use crate::utils::add_where;

/// STRIDE category of a catalog entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum ThreatCategory {
    Spoofing,
    Tampering,
    Repudiation,
    InformationDisclosure,
    DenialOfService,
    ElevationOfPrivilege,
}

impl ThreatCategory {
    /// Security properties an attack of this category violates. Threat
    /// scenarios link only to damage scenarios on these properties.
    pub fn violated_dimensions(&self) -> &'static [CiaDimension] {
        match self {
            ThreatCategory::Spoofing => {
                &[CiaDimension::Confidentiality, CiaDimension::Integrity]
            }
            ThreatCategory::Tampering => &[CiaDimension::Integrity],
            ThreatCategory::Repudiation => &[CiaDimension::Integrity],
            ThreatCategory::InformationDisclosure => &[CiaDimension::Confidentiality],
            ThreatCategory::DenialOfService => &[CiaDimension::Availability],
            ThreatCategory::ElevationOfPrivilege => {
                &[CiaDimension::Integrity, CiaDimension::Confidentiality]
            }
        }
    }
}

/// Trust zone a threat is applicable in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrustZone {
    Secure,
    Trusted,
    Untrusted,
    External,
}

/// Component kind a threat is applicable to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Controller,
    Gateway,
    Sensor,
    Actuator,
    Network,
    Storage,
    Interface,
    Application,
    Other,
}

/// Access required to mount an attack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttackVector {
    Network,
    Adjacent,
    Local,
    Physical,
}

/// A persistent catalog record describing one known attack technique,
/// enriched with domain applicability and baseline ratings.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ThreatCatalogEntry {
    pub id: Uuid,
    /// External technique identifier, unique across the catalog.
    pub technique_id: String,
    pub name: String,
    pub description: String,
    pub category: ThreatCategory,
    /// Component kinds this threat applies to; empty means any.
    pub component_types: Json<Vec<ComponentType>>,
    /// Trust zones this threat applies to; empty means any.
    pub trust_zones: Json<Vec<TrustZone>>,
    pub attack_vectors: Json<Vec<AttackVector>>,
    /// Baseline likelihood on a 1-5 scale.
    pub likelihood: i64,
    /// Baseline severity on a 1-5 scale.
    pub severity: i64,
    pub mitigations: Json<Vec<String>>,
    pub cross_refs: Json<Vec<String>>,
    pub examples: Option<String>,
    /// Curated relevance to the product domain on a 1-5 scale.
    pub relevance: i64,
    pub source: String,
    pub source_version: Option<String>,
    /// Set once a human edits the record; such records are skipped by
    /// catalog sync unless the caller forces an update.
    pub user_modified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFilter {
    pub category: Option<ThreatCategory>,
    pub source: Option<String>,
    pub user_modified: Option<bool>,
    pub min_relevance: Option<i64>,
    pub search_term: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const CATALOG_COLUMNS: &str = r#"id, technique_id, name, description, category, component_types,
    trust_zones, attack_vectors, likelihood, severity, mitigations, cross_refs, examples,
    relevance, source, source_version, user_modified, created_at, updated_at"#;

pub(crate) async fn catalog_entry_by_technique_id(
    conn: &mut SqliteConnection,
    technique_id: &str,
) -> Result<Option<ThreatCatalogEntry>> {
    Ok(sqlx::query_as::<_, ThreatCatalogEntry>(&format!(
        "SELECT {CATALOG_COLUMNS} FROM threat_catalog WHERE technique_id = ?"
    ))
    .bind(technique_id)
    .fetch_optional(conn)
    .await?)
}

pub(crate) async fn all_catalog_entries(
    conn: &mut SqliteConnection,
) -> Result<Vec<ThreatCatalogEntry>> {
    Ok(sqlx::query_as::<_, ThreatCatalogEntry>(&format!(
        "SELECT {CATALOG_COLUMNS} FROM threat_catalog ORDER BY technique_id ASC"
    ))
    .fetch_all(conn)
    .await?)
}

pub(crate) async fn insert_catalog_entry(
    conn: &mut SqliteConnection,
    entry: &ThreatCatalogEntry,
) -> Result<ThreatCatalogEntry> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    Ok(sqlx::query_as::<_, ThreatCatalogEntry>(&format!(
        r#"INSERT INTO threat_catalog (
            id, technique_id, name, description, category, component_types, trust_zones,
            attack_vectors, likelihood, severity, mitigations, cross_refs, examples,
            relevance, source, source_version, user_modified, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {CATALOG_COLUMNS}"#
    ))
    .bind(id)
    .bind(&entry.technique_id)
    .bind(&entry.name)
    .bind(&entry.description)
    .bind(entry.category)
    .bind(&entry.component_types)
    .bind(&entry.trust_zones)
    .bind(&entry.attack_vectors)
    .bind(entry.likelihood)
    .bind(entry.severity)
    .bind(&entry.mitigations)
    .bind(&entry.cross_refs)
    .bind(&entry.examples)
    .bind(entry.relevance)
    .bind(&entry.source)
    .bind(&entry.source_version)
    .bind(entry.user_modified)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?)
}

/// Overwrite the feed-controlled fields of an existing record. Leaves
/// `technique_id`, `user_modified` and `created_at` untouched.
pub(crate) async fn apply_feed_update(
    conn: &mut SqliteConnection,
    id: &Uuid,
    incoming: &ThreatCatalogEntry,
) -> Result<()> {
    let now = Utc::now();
    let affected = sqlx::query(
        r#"UPDATE threat_catalog SET name = ?, description = ?, category = ?,
            component_types = ?, trust_zones = ?, attack_vectors = ?, likelihood = ?,
            severity = ?, mitigations = ?, cross_refs = ?, examples = ?, relevance = ?,
            source = ?, source_version = ?, updated_at = ?
        WHERE id = ?"#,
    )
    .bind(&incoming.name)
    .bind(&incoming.description)
    .bind(incoming.category)
    .bind(&incoming.component_types)
    .bind(&incoming.trust_zones)
    .bind(&incoming.attack_vectors)
    .bind(incoming.likelihood)
    .bind(incoming.severity)
    .bind(&incoming.mitigations)
    .bind(&incoming.cross_refs)
    .bind(&incoming.examples)
    .bind(incoming.relevance)
    .bind(&incoming.source)
    .bind(&incoming.source_version)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::NotFoundError(format!(
            "Catalog entry with ID {id} not found"
        )));
    }
    Ok(())
}

impl DatabaseManager {
    /// Create a new catalog entry. The ID and timestamps of the passed value
    /// are replaced with fresh ones.
    #[instrument(skip(self, entry))]
    pub async fn create_catalog_entry(
        &self,
        entry: &ThreatCatalogEntry,
    ) -> Result<ThreatCatalogEntry> {
        debug!("Creating catalog entry: {}", entry.technique_id);
        let mut conn = self.pool.acquire().await?;
        insert_catalog_entry(&mut conn, entry).await
    }

    /// Get catalog entry by ID
    #[instrument(skip(self))]
    pub async fn get_catalog_entry_by_id(&self, id: &Uuid) -> Result<Option<ThreatCatalogEntry>> {
        Ok(sqlx::query_as::<_, ThreatCatalogEntry>(&format!(
            "SELECT {CATALOG_COLUMNS} FROM threat_catalog WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Get catalog entry by its external technique identifier
    #[instrument(skip(self))]
    pub async fn get_catalog_entry_by_technique_id(
        &self,
        technique_id: &str,
    ) -> Result<Option<ThreatCatalogEntry>> {
        let mut conn = self.pool.acquire().await?;
        catalog_entry_by_technique_id(&mut conn, technique_id).await
    }

    /// List catalog entries with filtering
    #[instrument(skip(self))]
    pub async fn list_catalog_entries(
        &self,
        filter: &CatalogFilter,
    ) -> Result<Vec<ThreatCatalogEntry>> {
        debug!("Listing catalog entries with filter: {:?}", filter);
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {CATALOG_COLUMNS} FROM threat_catalog"));

        let mut add_where = add_where();

        if let Some(category) = &filter.category {
            add_where(&mut qb);
            qb.push("category = ");
            qb.push_bind(*category);
        }
        if let Some(source) = &filter.source {
            add_where(&mut qb);
            qb.push("source = ");
            qb.push_bind(source);
        }
        if let Some(user_modified) = &filter.user_modified {
            add_where(&mut qb);
            qb.push("user_modified = ");
            qb.push_bind(*user_modified);
        }
        if let Some(min_relevance) = &filter.min_relevance {
            add_where(&mut qb);
            qb.push("relevance >= ");
            qb.push_bind(*min_relevance);
        }
        if let Some(search_term) = &filter.search_term {
            add_where(&mut qb);
            let pattern = format!("%{search_term}%");
            qb.push("(name LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR technique_id LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        qb.push(" ORDER BY technique_id ASC");

        if let Some(limit) = &filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(*limit as i64);
        }
        if let Some(offset) = &filter.offset {
            qb.push(" OFFSET ");
            qb.push_bind(*offset as i64);
        }

        Ok(qb
            .build_query_as::<'_, ThreatCatalogEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Count all catalog entries
    #[instrument(skip(self))]
    pub async fn count_catalog_entries(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM threat_catalog")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    /// Apply a human edit to a catalog entry. Marks the record as user
    /// modified so that later catalog syncs leave it alone.
    #[instrument(skip(self, entry))]
    pub async fn update_catalog_entry(&self, entry: &ThreatCatalogEntry) -> Result<()> {
        debug!("Updating catalog entry with ID: {}", entry.id);
        let now = Utc::now();
        let affected = sqlx::query(
            r#"UPDATE threat_catalog SET name = ?, description = ?, category = ?,
                component_types = ?, trust_zones = ?, attack_vectors = ?, likelihood = ?,
                severity = ?, mitigations = ?, cross_refs = ?, examples = ?, relevance = ?,
                user_modified = 1, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&entry.name)
        .bind(&entry.description)
        .bind(entry.category)
        .bind(&entry.component_types)
        .bind(&entry.trust_zones)
        .bind(&entry.attack_vectors)
        .bind(entry.likelihood)
        .bind(entry.severity)
        .bind(&entry.mitigations)
        .bind(&entry.cross_refs)
        .bind(&entry.examples)
        .bind(entry.relevance)
        .bind(now)
        .bind(entry.id)
        .execute(&self.pool)
        .await?;

        if affected.rows_affected() == 0 {
            return Err(AppError::NotFoundError(format!(
                "Catalog entry with ID {} not found",
                entry.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_violated_dimensions_per_category() {
        assert_eq!(
            ThreatCategory::Spoofing.violated_dimensions(),
            &[CiaDimension::Confidentiality, CiaDimension::Integrity]
        );
        assert_eq!(
            ThreatCategory::Tampering.violated_dimensions(),
            &[CiaDimension::Integrity]
        );
        assert_eq!(
            ThreatCategory::Repudiation.violated_dimensions(),
            &[CiaDimension::Integrity]
        );
        assert_eq!(
            ThreatCategory::InformationDisclosure.violated_dimensions(),
            &[CiaDimension::Confidentiality]
        );
        assert_eq!(
            ThreatCategory::DenialOfService.violated_dimensions(),
            &[CiaDimension::Availability]
        );
        assert_eq!(
            ThreatCategory::ElevationOfPrivilege.violated_dimensions(),
            &[CiaDimension::Integrity, CiaDimension::Confidentiality]
        );
    }

    #[tokio::test]
    async fn test_catalog_entry_roundtrip() {
        let db = DatabaseManager::setup_test_db().await;
        let entry = fixtures::catalog_entry(
            "T1557",
            ThreatCategory::Tampering,
            vec![ComponentType::Network],
            vec![TrustZone::Untrusted],
        );

        let created = db
            .create_catalog_entry(&entry)
            .await
            .expect("Failed to create catalog entry");
        assert_eq!(created.technique_id, "T1557");
        assert!(!created.user_modified);

        let fetched = db
            .get_catalog_entry_by_technique_id("T1557")
            .await
            .expect("Failed to get catalog entry")
            .expect("Catalog entry not found");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.category, ThreatCategory::Tampering);
        assert_eq!(fetched.component_types.0, vec![ComponentType::Network]);
        assert_eq!(fetched.trust_zones.0, vec![TrustZone::Untrusted]);
    }

    #[tokio::test]
    async fn test_technique_id_is_unique() {
        let db = DatabaseManager::setup_test_db().await;
        let entry = fixtures::catalog_entry(
            "T1040",
            ThreatCategory::InformationDisclosure,
            vec![],
            vec![],
        );
        db.create_catalog_entry(&entry)
            .await
            .expect("Failed to create catalog entry");
        assert!(db.create_catalog_entry(&entry).await.is_err());
    }

    #[tokio::test]
    async fn test_list_catalog_entries_with_filter() {
        let db = DatabaseManager::setup_test_db().await;
        db.create_catalog_entry(&fixtures::catalog_entry(
            "T1040",
            ThreatCategory::InformationDisclosure,
            vec![],
            vec![],
        ))
        .await
        .expect("Failed to create catalog entry");
        db.create_catalog_entry(&fixtures::catalog_entry(
            "T1557",
            ThreatCategory::Tampering,
            vec![],
            vec![],
        ))
        .await
        .expect("Failed to create catalog entry");

        let filter = CatalogFilter {
            category: Some(ThreatCategory::Tampering),
            ..Default::default()
        };
        let entries = db
            .list_catalog_entries(&filter)
            .await
            .expect("Failed to list catalog entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].technique_id, "T1557");

        assert_eq!(
            db.count_catalog_entries()
                .await
                .expect("Failed to count catalog entries"),
            2
        );
    }

    #[tokio::test]
    async fn test_update_marks_user_modified() {
        let db = DatabaseManager::setup_test_db().await;
        let created = db
            .create_catalog_entry(&fixtures::catalog_entry(
                "T1078",
                ThreatCategory::Spoofing,
                vec![],
                vec![],
            ))
            .await
            .expect("Failed to create catalog entry");

        let mut edited = created.clone();
        edited.likelihood = 5;
        db.update_catalog_entry(&edited)
            .await
            .expect("Failed to update catalog entry");

        let fetched = db
            .get_catalog_entry_by_id(&created.id)
            .await
            .expect("Failed to get catalog entry")
            .expect("Catalog entry not found");
        assert_eq!(fetched.likelihood, 5);
        assert!(fetched.user_modified);
        assert_eq!(fetched.created_at, created.created_at);
    }
}
