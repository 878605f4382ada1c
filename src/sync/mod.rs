//! Client-side state reconciliation for the bill feed.
//!
//! - [`feed`] - refresh status machine with stale-token rejection
//! - [`likes`] - optimistic like toggles with last-intent-wins rollback
//!
//! Neither submodule performs I/O. The network collaborator drives them through
//! the operations they expose and reports results back as plain values.

mod feed;
mod likes;

pub use feed::{
    Applied, FeedState, FeedStatus, FeedSync, RefreshFailure, RefreshOutcome, RefreshToken,
    StatusObserver,
};
pub use likes::{IntentId, LikeIntent, LikeLedger, LikeResolution, LikeSyncFailure};
