use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::db::DatabaseManager;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum RunStatus {
    Running = 0,
    Completed = 1,
    /// A later run replaced this run's scenarios.
    Superseded = 2,
}

/// Bookkeeping record for one scenario generation pass over a product.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRun {
    pub id: Uuid,
    pub product_id: Uuid,
    pub status: RunStatus,
    pub assets_processed: i64,
    pub damage_scenarios_created: i64,
    pub threat_scenarios_created: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

const RUN_COLUMNS: &str = "id, product_id, status, assets_processed, damage_scenarios_created, \
    threat_scenarios_created, started_at, finished_at";

pub(crate) async fn insert_generation_run(
    conn: &mut SqliteConnection,
    product_id: &Uuid,
) -> Result<GenerationRun> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    Ok(sqlx::query_as::<_, GenerationRun>(&format!(
        r#"INSERT INTO generation_runs (id, product_id, status, started_at)
           VALUES (?, ?, ?, ?)
           RETURNING {RUN_COLUMNS}"#
    ))
    .bind(id)
    .bind(product_id)
    .bind(RunStatus::Running)
    .bind(now)
    .fetch_one(conn)
    .await?)
}

/// Runs for the product that still own live scenarios.
pub(crate) async fn active_runs_for_product(
    conn: &mut SqliteConnection,
    product_id: &Uuid,
) -> Result<Vec<GenerationRun>> {
    Ok(sqlx::query_as::<_, GenerationRun>(&format!(
        "SELECT {RUN_COLUMNS} FROM generation_runs WHERE product_id = ? AND status != ?"
    ))
    .bind(product_id)
    .bind(RunStatus::Superseded)
    .fetch_all(conn)
    .await?)
}

pub(crate) async fn mark_run_superseded(conn: &mut SqliteConnection, id: &Uuid) -> Result<()> {
    sqlx::query("UPDATE generation_runs SET status = ? WHERE id = ?")
        .bind(RunStatus::Superseded)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn complete_generation_run(
    conn: &mut SqliteConnection,
    id: &Uuid,
    assets_processed: i64,
    damage_scenarios_created: i64,
    threat_scenarios_created: i64,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"UPDATE generation_runs SET status = ?, assets_processed = ?,
            damage_scenarios_created = ?, threat_scenarios_created = ?, finished_at = ?
        WHERE id = ?"#,
    )
    .bind(RunStatus::Completed)
    .bind(assets_processed)
    .bind(damage_scenarios_created)
    .bind(threat_scenarios_created)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

impl DatabaseManager {
    /// Get generation run by ID
    #[instrument(skip(self))]
    pub async fn get_generation_run_by_id(&self, id: &Uuid) -> Result<Option<GenerationRun>> {
        Ok(sqlx::query_as::<_, GenerationRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM generation_runs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// List generation runs for a product, newest first
    #[instrument(skip(self))]
    pub async fn list_generation_runs(&self, product_id: &Uuid) -> Result<Vec<GenerationRun>> {
        Ok(sqlx::query_as::<_, GenerationRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM generation_runs WHERE product_id = ? ORDER BY started_at DESC"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Latest generation run for a product, if any
    #[instrument(skip(self))]
    pub async fn latest_generation_run(&self, product_id: &Uuid) -> Result<Option<GenerationRun>> {
        Ok(sqlx::query_as::<_, GenerationRun>(&format!(
            r#"SELECT {RUN_COLUMNS} FROM generation_runs WHERE product_id = ?
               ORDER BY started_at DESC LIMIT 1"#
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let db = DatabaseManager::setup_test_db().await;
        let product = db
            .create_product("Gateway", "internal")
            .await
            .expect("Failed to create product");

        let mut conn = db.pool.acquire().await.expect("Failed to acquire connection");
        let run = insert_generation_run(&mut conn, &product.id)
            .await
            .expect("Failed to insert run");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        complete_generation_run(&mut conn, &run.id, 3, 6, 4)
            .await
            .expect("Failed to complete run");
        let active = active_runs_for_product(&mut conn, &product.id)
            .await
            .expect("Failed to list active runs");
        assert_eq!(active.len(), 1);
        drop(conn);

        let fetched = db
            .get_generation_run_by_id(&run.id)
            .await
            .expect("Failed to get run")
            .expect("Run not found");
        assert_eq!(fetched.status, RunStatus::Completed);
        assert_eq!(fetched.assets_processed, 3);
        assert_eq!(fetched.damage_scenarios_created, 6);
        assert_eq!(fetched.threat_scenarios_created, 4);
        assert!(fetched.finished_at.is_some());

        let mut conn = db.pool.acquire().await.expect("Failed to acquire connection");
        mark_run_superseded(&mut conn, &run.id)
            .await
            .expect("Failed to supersede run");
        let active = active_runs_for_product(&mut conn, &product.id)
            .await
            .expect("Failed to list active runs");
        assert!(active.is_empty());
        drop(conn);

        let latest = db
            .latest_generation_run(&product.id)
            .await
            .expect("Failed to get latest run")
            .expect("Run not found");
        assert_eq!(latest.status, RunStatus::Superseded);
    }
}
