use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, FeedSnapshot};
use crate::model::{Bill, Representatives};

type SnapshotRow = (String, Option<String>, i64);

impl Database {
    // ========================================================================
    // Feed Snapshot Operations
    // ========================================================================

    /// Persist the current feed so the next session can show it before its
    /// first refresh completes. Replaces any previous snapshot.
    pub async fn save_snapshot(
        &self,
        bills: &[Bill],
        representatives: Option<&Representatives>,
    ) -> Result<(), DatabaseError> {
        let bills_json = serde_json::to_string(bills)?;
        let reps_json = representatives.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO feed_snapshot (id, bills, representatives, saved_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                bills = excluded.bills,
                representatives = excluded.representatives,
                saved_at = excluded.saved_at
        "#,
        )
        .bind(bills_json)
        .bind(reps_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        tracing::debug!(bills = bills.len(), "Saved feed snapshot");
        Ok(())
    }

    /// Load the last saved snapshot, or `None` on a fresh database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Corrupt` if the stored JSON no longer decodes.
    pub async fn load_snapshot(&self) -> Result<Option<FeedSnapshot>, DatabaseError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT bills, representatives, saved_at FROM feed_snapshot WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some((bills_json, reps_json, saved_at)) = row else {
            return Ok(None);
        };

        let bills: Vec<Bill> = serde_json::from_str(&bills_json)?;
        let representatives: Option<Representatives> = reps_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Some(FeedSnapshot {
            bills,
            representatives,
            saved_at: DateTime::from_timestamp(saved_at, 0).unwrap_or_default(),
        }))
    }
}
