//! Optimistic like/unlike with conditional rollback.
//!
//! A toggle is applied to the local [`User`] the moment it happens. The network
//! acknowledgement arrives later and is matched against the latest intent for
//! that bill: only the latest intent may confirm or roll back, older ones are
//! superseded and their results dropped.

use crate::model::{BillId, User};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Identifier of one toggle. Unique per [`LikeLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntentId(u64);

impl IntentId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// An optimistic toggle awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeIntent {
    pub id: IntentId,
    pub bill: BillId,
    pub desired: bool,
    /// Membership before this toggle; restored if the toggle fails while still latest.
    pub previous: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Network error acknowledging a like. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("like sync failed for bill {bill}: {reason}")]
pub struct LikeSyncFailure {
    pub bill: BillId,
    pub reason: String,
}

/// What happened to an acknowledged intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeResolution {
    /// Server accepted the latest intent. `liked` is now durable.
    Confirmed { bill: BillId, liked: bool },
    /// Latest intent failed; local membership reverted to `restored`.
    RolledBack { bill: BillId, restored: bool },
    /// A newer toggle exists for this bill; the result was ignored.
    Superseded,
}

#[derive(Debug, Default)]
pub struct LikeLedger {
    user: User,
    pending: HashMap<BillId, LikeIntent>,
    next_id: u64,
}

impl LikeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate from the persisted like set.
    pub fn from_liked(liked: impl IntoIterator<Item = BillId>) -> Self {
        Self {
            user: liked.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn has_liked(&self, bill: BillId) -> bool {
        self.user.has_liked(bill)
    }

    /// Latest unacknowledged intent for `bill`.
    pub fn pending(&self, bill: BillId) -> Option<&LikeIntent> {
        self.pending.get(&bill)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply `desired` immediately and record it as the latest intent for `bill`.
    pub fn toggle_like(&mut self, bill: BillId, desired: bool) -> LikeIntent {
        self.next_id += 1;
        let previous = self.user.set_liked(bill, desired);
        let intent = LikeIntent {
            id: IntentId(self.next_id),
            bill,
            desired,
            previous,
            submitted_at: Utc::now(),
        };

        if let Some(older) = self.pending.insert(bill, intent) {
            tracing::debug!(
                bill = %bill,
                superseded = older.id.get(),
                intent = intent.id.get(),
                "Like intent superseded"
            );
        }
        tracing::debug!(bill = %bill, desired, previous, intent = intent.id.get(), "Like applied optimistically");
        intent
    }

    /// Reconcile a network result for `intent`.
    pub fn resolve(
        &mut self,
        intent: &LikeIntent,
        result: Result<(), LikeSyncFailure>,
    ) -> LikeResolution {
        let is_latest = self
            .pending
            .get(&intent.bill)
            .is_some_and(|latest| latest.id == intent.id);
        if !is_latest {
            tracing::debug!(
                bill = %intent.bill,
                intent = intent.id.get(),
                ok = result.is_ok(),
                "Ignoring result for superseded like intent"
            );
            return LikeResolution::Superseded;
        }
        self.pending.remove(&intent.bill);

        match result {
            Ok(()) => LikeResolution::Confirmed {
                bill: intent.bill,
                liked: intent.desired,
            },
            Err(failure) => {
                tracing::warn!(
                    bill = %intent.bill,
                    restored = intent.previous,
                    reason = %failure.reason,
                    "Like sync failed, rolling back"
                );
                self.user.set_liked(intent.bill, intent.previous);
                LikeResolution::RolledBack {
                    bill: intent.bill,
                    restored: intent.previous,
                }
            }
        }
    }
}
