//! Feed refresh status machine.
//!
//! `Idle → Refreshing → {Refreshed | Failed} → Refreshing → …`
//!
//! The feed snapshot is only ever replaced wholesale by a successful refresh.
//! Failures keep whatever was last fetched on screen (stale-while-revalidate).
//! Every `begin_refresh` issues a new [`RefreshToken`]; completions carrying any
//! other token are dropped, so a slow response to a superseded request can never
//! overwrite newer data.

use crate::model::{Bill, Representatives};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;

/// Lifecycle of the most recent fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    #[default]
    Idle,
    Refreshing,
    Refreshed,
    Failed,
}

/// Monotonic identifier for a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefreshToken(u64);

impl RefreshToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Network or parse failure while fetching the feed. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feed refresh failed: {reason}")]
pub struct RefreshFailure {
    pub reason: String,
}

impl RefreshFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result of one fetch, as reported by the network collaborator.
///
/// `representatives: None` means the response did not include them, which
/// keeps the previously known set.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Success {
        bills: Vec<Bill>,
        representatives: Option<Representatives>,
    },
    Failure {
        reason: RefreshFailure,
    },
}

/// Whether a completion was applied or dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Applied {
    Applied,
    Stale,
}

/// Snapshot visible to the rendering collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    pub status: FeedStatus,
    pub feed: Vec<Bill>,
    pub representatives: Option<Representatives>,
    /// Most recent failure, kept until the next successful refresh so the UI
    /// can offer a retry.
    pub last_failure: Option<RefreshFailure>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// Receives every status transition.
pub trait StatusObserver: Send {
    fn status_changed(&mut self, state: &FeedState);
}

impl StatusObserver for watch::Sender<FeedStatus> {
    fn status_changed(&mut self, state: &FeedState) {
        // Receivers may all be gone (e.g. the UI was torn down first); that is fine.
        self.send_replace(state.status);
    }
}

/// Owns [`FeedState`] and enforces the refresh transitions.
pub struct FeedSync {
    state: FeedState,
    generation: u64,
    outstanding: Option<RefreshToken>,
    observers: Vec<Box<dyn StatusObserver>>,
}

impl Default for FeedSync {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedSync {
    pub fn new() -> Self {
        Self {
            state: FeedState::default(),
            generation: 0,
            outstanding: None,
            observers: Vec::new(),
        }
    }

    /// Start from a previously persisted snapshot. Status stays `Idle`.
    pub fn with_snapshot(bills: Vec<Bill>, representatives: Option<Representatives>) -> Self {
        let mut sync = Self::new();
        sync.state.feed = bills;
        sync.state.representatives = representatives;
        sync
    }

    /// Seed the feed from persistence. Only allowed while `Idle`; returns
    /// whether the snapshot was taken.
    pub fn restore(&mut self, bills: Vec<Bill>, representatives: Option<Representatives>) -> bool {
        if self.state.status != FeedStatus::Idle {
            return false;
        }
        self.state.feed = bills;
        self.state.representatives = representatives;
        true
    }

    pub fn subscribe(&mut self, observer: impl StatusObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn status(&self) -> FeedStatus {
        self.state.status
    }

    pub fn feed(&self) -> &[Bill] {
        &self.state.feed
    }

    pub fn representatives(&self) -> Option<&Representatives> {
        self.state.representatives.as_ref()
    }

    /// Token of the refresh currently awaiting a result, if any.
    pub fn outstanding(&self) -> Option<RefreshToken> {
        self.outstanding
    }

    /// Mark a fetch as started. Never touches the feed.
    ///
    /// Calling this while another refresh is outstanding supersedes it: the
    /// older token will be rejected when its result arrives.
    pub fn begin_refresh(&mut self) -> RefreshToken {
        self.generation += 1;
        let token = RefreshToken(self.generation);
        if let Some(previous) = self.outstanding.replace(token) {
            tracing::debug!(
                superseded = previous.get(),
                token = token.get(),
                "Refresh superseded by newer request"
            );
        }
        self.transition(FeedStatus::Refreshing);
        token
    }

    /// Replace the feed with `bills`. Representatives are replaced only when given.
    pub fn complete_refresh(
        &mut self,
        token: RefreshToken,
        bills: Vec<Bill>,
        representatives: Option<Representatives>,
    ) -> Applied {
        if !self.accept(token) {
            return Applied::Stale;
        }

        tracing::debug!(
            token = token.get(),
            bills = bills.len(),
            representatives = representatives.as_ref().map(|r| r.len()),
            "Refresh complete"
        );
        self.state.feed = bills;
        if let Some(reps) = representatives {
            self.state.representatives = Some(reps);
        }
        self.state.last_failure = None;
        self.state.last_refreshed = Some(Utc::now());
        self.transition(FeedStatus::Refreshed);
        Applied::Applied
    }

    /// Record a failed fetch. Existing feed and representatives stay visible.
    pub fn fail_refresh(&mut self, token: RefreshToken, reason: RefreshFailure) -> Applied {
        if !self.accept(token) {
            return Applied::Stale;
        }

        tracing::warn!(
            token = token.get(),
            reason = %reason.reason,
            kept = self.state.feed.len(),
            "Refresh failed, keeping previous feed"
        );
        self.state.last_failure = Some(reason);
        self.transition(FeedStatus::Failed);
        Applied::Applied
    }

    pub fn apply(&mut self, token: RefreshToken, outcome: RefreshOutcome) -> Applied {
        match outcome {
            RefreshOutcome::Success {
                bills,
                representatives,
            } => self.complete_refresh(token, bills, representatives),
            RefreshOutcome::Failure { reason } => self.fail_refresh(token, reason),
        }
    }

    /// Consume the outstanding token if `token` matches it.
    fn accept(&mut self, token: RefreshToken) -> bool {
        if self.outstanding == Some(token) {
            self.outstanding = None;
            return true;
        }
        tracing::debug!(
            got = token.get(),
            expected = ?self.outstanding.map(RefreshToken::get),
            "Ignoring stale refresh result"
        );
        false
    }

    fn transition(&mut self, to: FeedStatus) {
        let from = self.state.status;
        self.state.status = to;
        tracing::trace!(?from, ?to, "Feed status transition");
        for observer in &mut self.observers {
            observer.status_changed(&self.state);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
