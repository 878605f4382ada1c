mod likes;
mod schema;
mod snapshot;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, FeedSnapshot};

use crate::model::BillId;
use anyhow::Result;
use async_trait::async_trait;

/// Persistence collaborator for the user's like membership.
///
/// Only written after the server accepts a toggle, so it holds the
/// server-confirmed state rather than the optimistic one.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn load_liked(&self) -> Result<Vec<BillId>>;

    async fn set_liked(&self, bill: BillId, liked: bool) -> Result<()>;
}
