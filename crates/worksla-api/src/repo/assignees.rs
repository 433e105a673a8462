//! Admin-owned assignee allowlist storage.

use sqlx::Row;

use crate::db::DbPool;
use crate::models::AllowlistEntry;

#[derive(Clone)]
pub struct AssigneeRepo {
    pool: DbPool,
}

impl AssigneeRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<AllowlistEntry>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM assignee_allowlist ORDER BY display_name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AllowlistEntry::from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<AllowlistEntry>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM assignee_allowlist WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AllowlistEntry::from_row).transpose()
    }

    pub async fn create(
        &self,
        upstream_user_id: i64,
        display_name: &str,
        active: bool,
    ) -> Result<AllowlistEntry, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO assignee_allowlist (upstream_user_id, display_name, active) \
             VALUES (?1, ?2, ?3) RETURNING *",
        )
        .bind(upstream_user_id)
        .bind(display_name)
        .bind(active)
        .fetch_one(&self.pool)
        .await?;
        AllowlistEntry::from_row(row)
    }

    /// Partial update; absent fields are left untouched. Returns the updated
    /// entry, or `None` when no row has this id.
    pub async fn update(
        &self,
        id: i64,
        display_name: Option<&str>,
        active: Option<bool>,
    ) -> Result<Option<AllowlistEntry>, sqlx::Error> {
        let row = sqlx::query(
            "UPDATE assignee_allowlist SET \
                 display_name = COALESCE(?2, display_name), \
                 active = COALESCE(?3, active) \
             WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .bind(display_name)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AllowlistEntry::from_row).transpose()
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM assignee_allowlist WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upstream user ids of the active entries, the set the filter runs on.
    pub async fn active_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT upstream_user_id FROM assignee_allowlist WHERE active = 1 \
             ORDER BY upstream_user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| row.try_get("upstream_user_id"))
            .collect()
    }

    /// Seed discovered assignees as inactive rows, skipping known user ids.
    /// Returns how many new rows were inserted.
    pub async fn seed_inactive(&self, pairs: &[(i64, String)]) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for (user_id, name) in pairs {
            let result = sqlx::query(
                "INSERT INTO assignee_allowlist (upstream_user_id, display_name, active) \
                 VALUES (?1, ?2, 0) ON CONFLICT(upstream_user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }
}
