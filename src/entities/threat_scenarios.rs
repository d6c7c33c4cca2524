use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::assets::CiaDimension;
use crate::entities::catalog::ThreatCategory;
use crate::error::Result;
use crate::storage::db::DatabaseManager;
use crate::utils::add_where;

/// Qualitative risk classification of a threat scenario.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    Critical,
}

/// A concrete attack path: one catalog technique applied to one asset,
/// linked to the damage scenarios it can bring about.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ThreatScenario {
    pub id: Uuid,
    pub product_id: Uuid,
    pub run_id: Uuid,
    pub asset_id: Uuid,
    pub catalog_entry_id: Uuid,
    /// Copied from the catalog entry so the scenario stays readable even if
    /// the catalog moves on.
    pub technique_id: String,
    pub name: String,
    pub description: String,
    pub category: ThreatCategory,
    /// How well the catalog entry's applicability matched the asset, 0 to 1.
    pub confidence: f64,
    pub likelihood: i64,
    pub severity: i64,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    pub source: String,
    pub source_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join row tying a threat scenario to one damage scenario it can cause,
/// annotated with the security property that makes the pair plausible.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ThreatScenarioDamageLink {
    pub threat_scenario_id: Uuid,
    pub damage_scenario_id: Uuid,
    pub dimension: CiaDimension,
}

#[skip_serializing_none]
#[derive(Debug, Default, Deserialize)]
pub struct ThreatScenarioFilter {
    pub product_id: Option<Uuid>,
    pub run_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
    pub category: Option<ThreatCategory>,
    pub risk_level: Option<RiskLevel>,
    pub min_risk_score: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const THREAT_COLUMNS: &str = r#"id, product_id, run_id, asset_id, catalog_entry_id, technique_id,
    name, description, category, confidence, likelihood, severity, risk_score, risk_level,
    source, source_version, created_at, updated_at"#;

pub(crate) async fn insert_threat_scenario(
    conn: &mut SqliteConnection,
    scenario: &ThreatScenario,
) -> Result<ThreatScenario> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    Ok(sqlx::query_as::<_, ThreatScenario>(&format!(
        r#"INSERT INTO threat_scenarios (
            id, product_id, run_id, asset_id, catalog_entry_id, technique_id, name, description,
            category, confidence, likelihood, severity, risk_score, risk_level, source,
            source_version, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {THREAT_COLUMNS}"#
    ))
    .bind(id)
    .bind(scenario.product_id)
    .bind(scenario.run_id)
    .bind(scenario.asset_id)
    .bind(scenario.catalog_entry_id)
    .bind(&scenario.technique_id)
    .bind(&scenario.name)
    .bind(&scenario.description)
    .bind(scenario.category)
    .bind(scenario.confidence)
    .bind(scenario.likelihood)
    .bind(scenario.severity)
    .bind(scenario.risk_score)
    .bind(scenario.risk_level)
    .bind(&scenario.source)
    .bind(&scenario.source_version)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?)
}

pub(crate) async fn insert_threat_damage_link(
    conn: &mut SqliteConnection,
    threat_scenario_id: &Uuid,
    damage_scenario_id: &Uuid,
    dimension: CiaDimension,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO threat_scenario_damage_links
            (threat_scenario_id, damage_scenario_id, dimension)
        VALUES (?, ?, ?)"#,
    )
    .bind(threat_scenario_id)
    .bind(damage_scenario_id)
    .bind(dimension)
    .execute(conn)
    .await?;
    Ok(())
}

/// Remove all threat scenarios that belong to a run. Damage links go with
/// them via cascade.
pub(crate) async fn delete_threat_scenarios_for_run(
    conn: &mut SqliteConnection,
    run_id: &Uuid,
) -> Result<u64> {
    let affected = sqlx::query("DELETE FROM threat_scenarios WHERE run_id = ?")
        .bind(run_id)
        .execute(conn)
        .await?;
    Ok(affected.rows_affected())
}

impl DatabaseManager {
    /// Get threat scenario by ID
    #[instrument(skip(self))]
    pub async fn get_threat_scenario_by_id(&self, id: &Uuid) -> Result<Option<ThreatScenario>> {
        Ok(sqlx::query_as::<_, ThreatScenario>(&format!(
            "SELECT {THREAT_COLUMNS} FROM threat_scenarios WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// List threat scenarios with filtering
    #[instrument(skip(self))]
    pub async fn list_threat_scenarios(
        &self,
        filter: &ThreatScenarioFilter,
    ) -> Result<Vec<ThreatScenario>> {
        debug!("Listing threat scenarios with filter: {:?}", filter);
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {THREAT_COLUMNS} FROM threat_scenarios"));

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
        if let Some(asset_id) = &filter.asset_id {
            add_where(&mut qb);
            qb.push("asset_id = ");
            qb.push_bind(asset_id);
        }
        if let Some(category) = &filter.category {
            add_where(&mut qb);
            qb.push("category = ");
            qb.push_bind(*category);
        }
        if let Some(risk_level) = &filter.risk_level {
            add_where(&mut qb);
            qb.push("risk_level = ");
            qb.push_bind(*risk_level);
        }
        if let Some(min_risk_score) = &filter.min_risk_score {
            add_where(&mut qb);
            qb.push("risk_score >= ");
            qb.push_bind(*min_risk_score);
        }

        qb.push(" ORDER BY risk_score DESC, name ASC");

        if let Some(limit) = &filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(*limit as i64);
        }
        if let Some(offset) = &filter.offset {
            qb.push(" OFFSET ");
            qb.push_bind(*offset as i64);
        }

        Ok(qb
            .build_query_as::<'_, ThreatScenario>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Damage scenarios a threat scenario is linked to
    #[instrument(skip(self))]
    pub async fn list_threat_damage_links(
        &self,
        threat_scenario_id: &Uuid,
    ) -> Result<Vec<ThreatScenarioDamageLink>> {
        Ok(sqlx::query_as::<_, ThreatScenarioDamageLink>(
            r#"SELECT threat_scenario_id, damage_scenario_id, dimension
               FROM threat_scenario_damage_links
               WHERE threat_scenario_id = ?"#,
        )
        .bind(threat_scenario_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
