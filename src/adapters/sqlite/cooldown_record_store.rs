//! SQLite implementation of the CooldownRecordStore.
//!
//! Records are stored whole as JSON, keyed by `(namespace, name)`. The owner
//! UID and managed flag are denormalized into columns for orphan collection.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::StoreError;
use crate::domain::models::CooldownStateRecord;
use crate::domain::ports::CooldownRecordStore;

#[derive(Clone)]
pub struct SqliteCooldownRecordStore {
    pool: SqlitePool,
}

impl SqliteCooldownRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CooldownRecordRow {
    record_json: String,
}

fn row_to_record(row: CooldownRecordRow) -> Result<CooldownStateRecord, StoreError> {
    Ok(serde_json::from_str(&row.record_json)?)
}

#[async_trait]
impl CooldownRecordStore for SqliteCooldownRecordStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CooldownStateRecord>, StoreError> {
        let row: Option<CooldownRecordRow> =
            sqlx::query_as("SELECT record_json FROM cooldown_records WHERE namespace = ? AND name = ?")
                .bind(namespace)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_record).transpose()
    }

    async fn create(&self, record: &CooldownStateRecord) -> Result<(), StoreError> {
        let record_json = serde_json::to_string(record)?;
        let result = sqlx::query(
            r#"INSERT INTO cooldown_records (namespace, name, owner_uid, managed, record_json, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (namespace, name) DO NOTHING"#,
        )
        .bind(&record.metadata.namespace)
        .bind(&record.metadata.name)
        .bind(record.owner_uid())
        .bind(i32::from(record.is_managed()))
        .bind(&record_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                namespace: record.metadata.namespace.clone(),
                name: record.metadata.name.clone(),
            });
        }
        Ok(())
    }

    async fn replace(&self, record: &CooldownStateRecord) -> Result<(), StoreError> {
        let record_json = serde_json::to_string(record)?;
        let result = sqlx::query(
            r#"UPDATE cooldown_records
               SET owner_uid = ?, managed = ?, record_json = ?, updated_at = ?
               WHERE namespace = ? AND name = ?"#,
        )
        .bind(record.owner_uid())
        .bind(i32::from(record.is_managed()))
        .bind(&record_json)
        .bind(Utc::now().to_rfc3339())
        .bind(&record.metadata.namespace)
        .bind(&record.metadata.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                namespace: record.metadata.namespace.clone(),
                name: record.metadata.name.clone(),
            });
        }
        Ok(())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<CooldownStateRecord>, StoreError> {
        let rows: Vec<CooldownRecordRow> = match namespace {
            Some(ns) => {
                sqlx::query_as("SELECT record_json FROM cooldown_records WHERE namespace = ? ORDER BY name")
                    .bind(ns)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT record_json FROM cooldown_records ORDER BY namespace, name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(row_to_record).collect()
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cooldown_records WHERE namespace = ? AND name = ?")
            .bind(namespace)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{ObjectIdentity, PolicyRef, RemediationPolicy, SuppressionKey};
    use chrono::Duration;
    use std::collections::HashMap;

    async fn setup() -> SqliteCooldownRecordStore {
        SqliteCooldownRecordStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn record(policy: &RemediationPolicy) -> CooldownStateRecord {
        let now = Utc::now();
        let key = SuppressionKey::new(
            PolicyRef::new(&policy.metadata.namespace, &policy.metadata.name),
            ObjectIdentity::new("default", "Deployment", "web"),
            "BackOff",
        );
        let entries = HashMap::from([(key, now + Duration::hours(2))]);
        CooldownStateRecord::encode(policy, &entries, now).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = setup().await;
        let policy = RemediationPolicy::new("ops", "p");
        let rec = record(&policy);
        store.create(&rec).await.unwrap();

        let loaded = store.get("ops", "p-cooldown-state").await.unwrap().unwrap();
        assert_eq!(loaded, rec);
        assert!(store.get("ops", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conflict_and_replace_missing() {
        let store = setup().await;
        let rec = record(&RemediationPolicy::new("ops", "p"));
        store.create(&rec).await.unwrap();
        assert!(matches!(
            store.create(&rec).await.unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));

        let other = record(&RemediationPolicy::new("ops", "q"));
        assert!(matches!(
            store.replace(&other).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = setup().await;
        store.create(&record(&RemediationPolicy::new("ops", "a"))).await.unwrap();
        store.create(&record(&RemediationPolicy::new("dev", "b"))).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("dev")).await.unwrap().len(), 1);

        store.delete("dev", "b-cooldown-state").await.unwrap();
        store.delete("dev", "b-cooldown-state").await.unwrap();
        assert!(store.list(Some("dev")).await.unwrap().is_empty());
    }
}
