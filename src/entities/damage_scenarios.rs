use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::assets::{Asset, CiaDimension, SecurityLevel};
use crate::error::Result;
use crate::storage::db::DatabaseManager;
use crate::utils::add_where;

/// Magnitude of harm on one sub-impact axis.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum ImpactLevel {
    #[default]
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl From<SecurityLevel> for ImpactLevel {
    fn from(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::None => ImpactLevel::None,
            SecurityLevel::Low => ImpactLevel::Low,
            SecurityLevel::Medium => ImpactLevel::Medium,
            SecurityLevel::High => ImpactLevel::High,
        }
    }
}

/// What the product's stakeholders lose when one security property of an
/// asset is violated.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DamageScenario {
    pub id: Uuid,
    pub product_id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    pub description: String,
    /// Security property whose violation this scenario describes.
    pub category: CiaDimension,
    /// Worst sub-impact rating across the four axes.
    pub severity: ImpactLevel,
    pub violates_confidentiality: bool,
    pub violates_integrity: bool,
    pub violates_availability: bool,
    pub safety_impact: ImpactLevel,
    pub financial_impact: ImpactLevel,
    pub operational_impact: ImpactLevel,
    pub privacy_impact: ImpactLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Default, Deserialize)]
pub struct DamageScenarioFilter {
    pub product_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub category: Option<CiaDimension>,
    pub min_severity: Option<ImpactLevel>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const DAMAGE_COLUMNS: &str = r#"id, product_id, run_id, name, description, category, severity,
    violates_confidentiality, violates_integrity, violates_availability, safety_impact,
    financial_impact, operational_impact, privacy_impact, created_at, updated_at"#;

pub(crate) async fn insert_damage_scenario(
    conn: &mut SqliteConnection,
    scenario: &DamageScenario,
) -> Result<DamageScenario> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    Ok(sqlx::query_as::<_, DamageScenario>(&format!(
        r#"INSERT INTO damage_scenarios (
            id, product_id, run_id, name, description, category, severity,
            violates_confidentiality, violates_integrity, violates_availability,
            safety_impact, financial_impact, operational_impact, privacy_impact,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {DAMAGE_COLUMNS}"#
    ))
    .bind(id)
    .bind(scenario.product_id)
    .bind(scenario.run_id)
    .bind(&scenario.name)
    .bind(&scenario.description)
    .bind(scenario.category)
    .bind(scenario.severity)
    .bind(scenario.violates_confidentiality)
    .bind(scenario.violates_integrity)
    .bind(scenario.violates_availability)
    .bind(scenario.safety_impact)
    .bind(scenario.financial_impact)
    .bind(scenario.operational_impact)
    .bind(scenario.privacy_impact)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?)
}

pub(crate) async fn link_damage_scenario_asset(
    conn: &mut SqliteConnection,
    damage_scenario_id: &Uuid,
    asset_id: &Uuid,
) -> Result<()> {
    sqlx::query("INSERT INTO damage_scenario_assets (damage_scenario_id, asset_id) VALUES (?, ?)")
        .bind(damage_scenario_id)
        .bind(asset_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Remove all damage scenarios that belong to a run. Asset links go with
/// them via cascade.
pub(crate) async fn delete_damage_scenarios_for_run(
    conn: &mut SqliteConnection,
    run_id: &Uuid,
) -> Result<u64> {
    let affected = sqlx::query("DELETE FROM damage_scenarios WHERE run_id = ?")
        .bind(run_id)
        .execute(conn)
        .await?;
    Ok(affected.rows_affected())
}

impl DatabaseManager {
    /// Get damage scenario by ID
    #[instrument(skip(self))]
    pub async fn get_damage_scenario_by_id(&self, id: &Uuid) -> Result<Option<DamageScenario>> {
        Ok(sqlx::query_as::<_, DamageScenario>(&format!(
            "SELECT {DAMAGE_COLUMNS} FROM damage_scenarios WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// List damage scenarios with filtering
    #[instrument(skip(self))]
    pub async fn list_damage_scenarios(
        &self,
        filter: &DamageScenarioFilter,
    ) -> Result<Vec<DamageScenario>> {
        debug!("Listing damage scenarios with filter: {:?}", filter);
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {DAMAGE_COLUMNS} FROM damage_scenarios"));

        let mut add_where = add_where();

        if let Some(product_id) = &filter.product_id {
            add_where(&mut qb);
            qb.push("product_id = ");
            qb.push_bind(product_id);
        }
        if let Some(run_id) = &filter.run_id {
            add_where(&mut qb);
            qb.push("run_id = ");
            qb.push_bind(run_id);
        }
        if let Some(category) = &filter.category {
            add_where(&mut qb);
            qb.push("category = ");
            qb.push_bind(*category);
        }
        if let Some(min_severity) = &filter.min_severity {
            add_where(&mut qb);
            qb.push("severity >= ");
            qb.push_bind(*min_severity);
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
            .build_query_as::<'_, DamageScenario>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Assets a damage scenario concerns
    #[instrument(skip(self))]
    pub async fn list_damage_scenario_assets(
        &self,
        damage_scenario_id: &Uuid,
    ) -> Result<Vec<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(
            r#"SELECT a.id, a.product_id, a.name, a.asset_type, a.confidentiality, a.integrity,
                      a.availability, a.safety_class, a.created_at, a.updated_at
               FROM assets a
               JOIN damage_scenario_assets dsa ON dsa.asset_id = a.id
               WHERE dsa.damage_scenario_id = ?
               ORDER BY a.name ASC"#,
        )
        .bind(damage_scenario_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
