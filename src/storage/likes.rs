use anyhow::Result;
use async_trait::async_trait;

use super::schema::Database;
use super::LikeStore;
use crate::model::BillId;

impl Database {
    // ========================================================================
    // Like Membership Operations
    // ========================================================================

    /// All bills the user has liked (confirmed by the server), ascending.
    pub async fn get_liked_bills(&self) -> Result<Vec<BillId>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT bill_id FROM liked_bills ORDER BY bill_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| BillId(id)).collect())
    }

    /// Record `liked` for `bill`. Liking twice keeps the original timestamp.
    pub async fn set_bill_liked(&self, bill: BillId, liked: bool) -> Result<()> {
        if liked {
            sqlx::query(
                r#"
                INSERT INTO liked_bills (bill_id, liked_at)
                VALUES (?, strftime('%s', 'now'))
                ON CONFLICT(bill_id) DO NOTHING
            "#,
            )
            .bind(bill.0)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM liked_bills WHERE bill_id = ?")
                .bind(bill.0)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl LikeStore for Database {
    async fn load_liked(&self) -> Result<Vec<BillId>> {
        self.get_liked_bills().await
    }

    async fn set_liked(&self, bill: BillId, liked: bool) -> Result<()> {
        self.set_bill_liked(bill, liked).await
    }
}

#[cfg(test)]
mod tests {
    use crate::model::BillId;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_no_likes_initially() {
        let db = test_db().await;
        assert!(db.get_liked_bills().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_like_and_unlike() {
        let db = test_db().await;
        db.set_bill_liked(BillId(20), true).await.unwrap();
        db.set_bill_liked(BillId(10), true).await.unwrap();
        assert_eq!(
            db.get_liked_bills().await.unwrap(),
            vec![BillId(10), BillId(20)]
        );

        db.set_bill_liked(BillId(20), false).await.unwrap();
        assert_eq!(db.get_liked_bills().await.unwrap(), vec![BillId(10)]);
    }

    #[tokio::test]
    async fn test_like_is_idempotent() {
        let db = test_db().await;
        db.set_bill_liked(BillId(3), true).await.unwrap();
        db.set_bill_liked(BillId(3), true).await.unwrap();
        assert_eq!(db.get_liked_bills().await.unwrap(), vec![BillId(3)]);
    }

    #[tokio::test]
    async fn test_unlike_missing_is_noop() {
        let db = test_db().await;
        db.set_bill_liked(BillId(99), false).await.unwrap();
        assert!(db.get_liked_bills().await.unwrap().is_empty());
    }
}
