//! Key/value settings storage. Values are arbitrary JSON under dotted keys
//! (`openproject.base_url`, ...); the upstream client reads its credential
//! overrides from here.

use serde_json::Value;

use crate::db::DbPool;
use crate::models::Setting;

#[derive(Clone)]
pub struct SettingsRepo {
    pool: DbPool,
}

impl SettingsRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Setting>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Setting::from_row).collect()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Setting>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Setting::from_row).transpose()
    }

    /// The JSON value under `key`, or `None` when unset.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>, sqlx::Error> {
        Ok(self.get(key).await?.map(|setting| setting.value))
    }

    pub async fn upsert(
        &self,
        key: &str,
        value: &Value,
        description: Option<&str>,
    ) -> Result<Setting, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO settings (key, value, description) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET \
                 value = excluded.value, \
                 description = COALESCE(excluded.description, settings.description) \
             RETURNING *",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Setting::from_row(row)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
