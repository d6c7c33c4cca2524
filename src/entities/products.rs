use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::db::DatabaseManager;

/// A product under assessment, e.g. an ECU, a gateway or a connected device.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Free-text deployment zone tag ("critical", "internal", "exposed", ...).
    pub trust_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) async fn product_by_id(
    conn: &mut SqliteConnection,
    id: &Uuid,
) -> Result<Option<Product>> {
    Ok(sqlx::query_as::<_, Product>(
        "SELECT id, name, trust_zone, created_at, updated_at FROM products WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?)
}

impl DatabaseManager {
    /// Create a new product
    #[instrument(skip(self))]
    pub async fn create_product(&self, name: &str, trust_zone: &str) -> Result<Product> {
        let id = Uuid::new_v4();
        debug!("Creating product with ID: {}", id);
        let now = Utc::now();

        Ok(sqlx::query_as::<_, Product>(
            r#"INSERT INTO products (id, name, trust_zone, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING id, name, trust_zone, created_at, updated_at"#,
        )
        .bind(id)
        .bind(name)
        .bind(trust_zone)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Get product by ID
    #[instrument(skip(self))]
    pub async fn get_product_by_id(&self, id: &Uuid) -> Result<Option<Product>> {
        debug!("Getting product by ID: {}", id);
        let mut conn = self.pool.acquire().await?;
        product_by_id(&mut conn, id).await
    }

    /// List all products
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT id, name, trust_zone, created_at, updated_at FROM products ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Delete product, cascading to its assets and generated scenarios
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &Uuid) -> Result<()> {
        debug!("Deleting product with ID: {}", id);
        let affected = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if affected.rows_affected() == 0 {
            return Err(AppError::NotFoundError(format!(
                "Product with ID {id} not found"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_product_crud() {
        let db = DatabaseManager::setup_test_db().await;

        let product = db
            .create_product("Telematics Unit", "exposed")
            .await
            .expect("Failed to create product");
        assert_eq!(product.name, "Telematics Unit");
        assert_eq!(product.trust_zone, "exposed");

        let fetched = db
            .get_product_by_id(&product.id)
            .await
            .expect("Failed to get product")
            .expect("Product not found");
        assert_eq!(fetched.id, product.id);

        let all = db.list_products().await.expect("Failed to list products");
        assert_eq!(all.len(), 1);

        db.delete_product(&product.id)
            .await
            .expect("Failed to delete product");
        assert!(
            db.get_product_by_id(&product.id)
                .await
                .expect("Failed to get product")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_missing_product_fails() {
        let db = DatabaseManager::setup_test_db().await;
        let result = db.delete_product(&Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFoundError(_))));
    }
}
