use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::db::DatabaseManager;
use crate::utils::add_where;

/// Protection-need rating for a single security property of an asset.
/// Ordered so that ratings can be compared directly.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum SecurityLevel {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

/// Safety integrity classification of an asset. `Qm` means the asset has no
/// safety relevance.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[repr(i32)]
pub enum SafetyClass {
    Qm = 0,
    AsilA = 1,
    AsilB = 2,
    AsilC = 3,
    AsilD = 4,
}

impl SafetyClass {
    /// Whether a compromise of the asset can plausibly endanger people.
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, SafetyClass::AsilC | SafetyClass::AsilD)
    }
}

/// One of the three classic security properties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CiaDimension {
    Confidentiality,
    Integrity,
    Availability,
}

impl CiaDimension {
    pub const ALL: [CiaDimension; 3] = [
        CiaDimension::Confidentiality,
        CiaDimension::Integrity,
        CiaDimension::Availability,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CiaDimension::Confidentiality => "confidentiality",
            CiaDimension::Integrity => "integrity",
            CiaDimension::Availability => "availability",
        }
    }
}

/// A protection-worthy element of a product: a data store, a bus interface,
/// a piece of firmware.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    /// Free-text component tag ("controller", "gateway", "sensor", ...).
    pub asset_type: String,
    pub confidentiality: SecurityLevel,
    pub integrity: SecurityLevel,
    pub availability: SecurityLevel,
    pub safety_class: SafetyClass,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Rating recorded for the given security property.
    pub fn rating_for(&self, dimension: CiaDimension) -> SecurityLevel {
        match dimension {
            CiaDimension::Confidentiality => self.confidentiality,
            CiaDimension::Integrity => self.integrity,
            CiaDimension::Availability => self.availability,
        }
    }

    /// Properties rated Medium or higher. Only these produce damage
    /// scenarios; Low and None ratings are not worth tracking.
    pub fn active_dimensions(&self) -> Vec<CiaDimension> {
        CiaDimension::ALL
            .into_iter()
            .filter(|dimension| self.rating_for(*dimension) >= SecurityLevel::Medium)
            .collect()
    }
}

#[skip_serializing_none]
#[derive(Debug, Default, Deserialize)]
pub struct AssetFilter {
    pub product_id: Option<Uuid>,
    pub asset_type: Option<String>,
    pub safety_class: Option<SafetyClass>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub(crate) async fn assets_for_product(
    conn: &mut SqliteConnection,
    product_id: &Uuid,
) -> Result<Vec<Asset>> {
    Ok(sqlx::query_as::<_, Asset>(
        r#"SELECT id, product_id, name, asset_type, confidentiality, integrity, availability,
                  safety_class, created_at, updated_at
           FROM assets WHERE product_id = ? ORDER BY name ASC"#,
    )
    .bind(product_id)
    .fetch_all(conn)
    .await?)
}

impl DatabaseManager {
    /// Create a new asset. The ID and timestamps of the passed value are
    /// replaced with fresh ones.
    #[instrument(skip(self, asset))]
    pub async fn create_asset(&self, asset: &Asset) -> Result<Asset> {
        let id = Uuid::new_v4();
        debug!("Creating asset with ID: {}", id);
        let now = Utc::now();

        Ok(sqlx::query_as::<_, Asset>(
            r#"INSERT INTO assets (
                id, product_id, name, asset_type, confidentiality, integrity, availability,
                safety_class, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, product_id, name, asset_type, confidentiality, integrity, availability,
                      safety_class, created_at, updated_at"#,
        )
        .bind(id)
        .bind(asset.product_id)
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(asset.confidentiality)
        .bind(asset.integrity)
        .bind(asset.availability)
        .bind(asset.safety_class)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Get asset by ID
    #[instrument(skip(self))]
    pub async fn get_asset_by_id(&self, id: &Uuid) -> Result<Option<Asset>> {
        debug!("Getting asset by ID: {}", id);
        Ok(sqlx::query_as::<_, Asset>(
            r#"SELECT id, product_id, name, asset_type, confidentiality, integrity, availability,
                      safety_class, created_at, updated_at
               FROM assets WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// List assets with filtering
    #[instrument(skip(self))]
    pub async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        debug!("Listing assets with filter: {:?}", filter);
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT id, product_id, name, asset_type, confidentiality, integrity, availability,
                      safety_class, created_at, updated_at
               FROM assets"#,
        );

        let mut add_where = add_where();

        if let Some(product_id) = &filter.product_id {
            add_where(&mut qb);
            qb.push("product_id = ");
            qb.push_bind(product_id);
        }
        if let Some(asset_type) = &filter.asset_type {
            add_where(&mut qb);
            qb.push("asset_type = ");
            qb.push_bind(asset_type);
        }
        if let Some(safety_class) = &filter.safety_class {
            add_where(&mut qb);
            qb.push("safety_class = ");
            qb.push_bind(*safety_class);
        }

        qb.push(" ORDER BY name ASC");

        if let Some(limit) = &filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(*limit as i64);
        }
        if let Some(offset) = &filter.offset {
            qb.push(" OFFSET ");
            qb.push_bind(*offset as i64);
        }

        Ok(qb
            .build_query_as::<'_, Asset>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Update asset ratings and metadata
    #[instrument(skip(self, asset))]
    pub async fn update_asset(&self, asset: &Asset) -> Result<()> {
        debug!("Updating asset with ID: {}", asset.id);
        let now = Utc::now();
        let affected = sqlx::query(
            r#"UPDATE assets SET name = ?, asset_type = ?, confidentiality = ?, integrity = ?,
                availability = ?, safety_class = ?, updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&asset.name)
        .bind(&asset.asset_type)
        .bind(asset.confidentiality)
        .bind(asset.integrity)
        .bind(asset.availability)
        .bind(asset.safety_class)
        .bind(now)
        .bind(asset.id)
        .execute(&self.pool)
        .await?;

        if affected.rows_affected() == 0 {
            return Err(AppError::NotFoundError(format!(
                "Asset with ID {} not found",
                asset.id
            )));
        }
        Ok(())
    }

    /// Delete asset
    #[instrument(skip(self))]
    pub async fn delete_asset(&self, id: &Uuid) -> Result<()> {
        debug!("Deleting asset with ID: {}", id);
        let affected = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if affected.rows_affected() == 0 {
            return Err(AppError::NotFoundError(format!(
                "Asset with ID {id} not found"
            )));
        }
        Ok(())
    }
}
