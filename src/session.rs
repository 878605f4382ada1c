//! Per-login session wiring the synchronization core to its collaborators.
//!
//! Network calls run as spawned tasks. Each task reports back exactly one
//! [`SessionEvent`] over the channel returned by [`Session::new`]; the owner of
//! the receiver hands events to [`Session::handle_event`] one at a time, so the
//! core state is only ever mutated from that single loop.

use crate::model::{Bill, BillId, Representatives, User};
use crate::network::{BillsApi, FeedPayload, FetchError};
use crate::storage::LikeStore;
use crate::sync::{
    Applied, FeedState, FeedStatus, FeedSync, IntentId, LikeIntent, LikeLedger, LikeResolution,
    LikeSyncFailure, RefreshFailure, RefreshOutcome, RefreshToken, StatusObserver,
};
use anyhow::Result;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Capacity of the session event channel.
const EVENT_CHANNEL_SIZE: usize = 32;

/// Results posted back by background network tasks.
#[derive(Debug)]
pub enum SessionEvent {
    RefreshFinished {
        token: RefreshToken,
        outcome: RefreshOutcome,
    },
    LikeAcknowledged {
        intent: LikeIntent,
        result: Result<(), LikeSyncFailure>,
    },
}

/// What [`Session::handle_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Refreshed,
    RefreshFailed,
    /// Result of a superseded or already settled refresh.
    StaleRefresh,
    Like(LikeResolution),
}

pub struct Session {
    feed: FeedSync,
    likes: LikeLedger,
    api: Arc<dyn BillsApi>,
    store: Arc<dyn LikeStore>,
    event_tx: mpsc::Sender<SessionEvent>,
    tasks: JoinSet<()>,
    /// Newest intent per bill the server has accepted and the store recorded.
    persisted: HashMap<BillId, IntentId>,
}

impl Session {
    /// Build a session around its collaborators.
    ///
    /// The returned receiver carries every [`SessionEvent`]; feed them back
    /// through [`handle_event`](Self::handle_event).
    pub fn new(
        api: Arc<dyn BillsApi>,
        store: Arc<dyn LikeStore>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let session = Self {
            feed: FeedSync::new(),
            likes: LikeLedger::new(),
            api,
            store,
            event_tx,
            tasks: JoinSet::new(),
            persisted: HashMap::new(),
        };
        (session, event_rx)
    }

    /// Load the confirmed like set from the persistence collaborator.
    ///
    /// Call before the first toggle; it replaces the in-memory membership.
    pub async fn hydrate(&mut self) -> Result<()> {
        let liked = self.store.load_liked().await?;
        tracing::debug!(liked = liked.len(), "Hydrated like membership");
        self.likes = LikeLedger::from_liked(liked);
        Ok(())
    }

    /// Show a persisted feed before the first refresh. Ignored once a refresh
    /// has started.
    pub fn restore_feed(&mut self, bills: Vec<Bill>, representatives: Option<Representatives>) {
        if !self.feed.restore(bills, representatives) {
            tracing::debug!(status = ?self.feed.status(), "Skipping feed restore, refresh already started");
        }
    }

    pub fn subscribe(&mut self, observer: impl StatusObserver + 'static) {
        self.feed.subscribe(observer);
    }

    pub fn state(&self) -> &FeedState {
        self.feed.state()
    }

    pub fn status(&self) -> FeedStatus {
        self.feed.status()
    }

    pub fn user(&self) -> &User {
        self.likes.user()
    }

    pub fn has_liked(&self, bill: BillId) -> bool {
        self.likes.has_liked(bill)
    }

    /// Start a refresh. Any refresh still in flight is superseded; its result
    /// will be reported as [`Handled::StaleRefresh`].
    pub fn request_refresh(&mut self) -> RefreshToken {
        let token = self.feed.begin_refresh();
        let api = Arc::clone(&self.api);
        let tx = self.event_tx.clone();

        self.tasks.spawn(async move {
            let outcome = match catch_panic(api.fetch_feed()).await {
                Ok(result) => refresh_outcome(result),
                Err(panic) => {
                    tracing::error!(error = %panic, task = "refresh", "Background task panicked");
                    RefreshOutcome::Failure {
                        reason: RefreshFailure::new(format!("internal error: {}", panic)),
                    }
                }
            };
            if let Err(e) = tx.send(SessionEvent::RefreshFinished { token, outcome }).await {
                tracing::warn!(error = %e, event = "RefreshFinished", "Channel send failed (receiver dropped)");
            }
        });
        token
    }

    /// Flip the like state of `bill`.
    pub fn toggle_like(&mut self, bill: BillId) -> LikeIntent {
        let desired = !self.likes.has_liked(bill);
        self.set_like(bill, desired)
    }

    /// Apply `desired` locally right away and send it to the server.
    pub fn set_like(&mut self, bill: BillId, desired: bool) -> LikeIntent {
        let intent = self.likes.toggle_like(bill, desired);
        let api = Arc::clone(&self.api);
        let tx = self.event_tx.clone();

        self.tasks.spawn(async move {
            let result = match catch_panic(api.set_like(bill, desired)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(LikeSyncFailure {
                    bill,
                    reason: e.to_string(),
                }),
                Err(panic) => {
                    tracing::error!(error = %panic, task = "like", "Background task panicked");
                    Err(LikeSyncFailure {
                        bill,
                        reason: format!("internal error: {}", panic),
                    })
                }
            };
            if let Err(e) = tx
                .send(SessionEvent::LikeAcknowledged { intent, result })
                .await
            {
                tracing::warn!(error = %e, event = "LikeAcknowledged", "Channel send failed (receiver dropped)");
            }
        });
        intent
    }

    /// Apply one background result to the core state.
    ///
    /// Every accepted toggle newer than the last one stored is written to the
    /// persistence collaborator, including superseded ones: a newer toggle may
    /// still fail, leaving the server at the older value. A write failure is
    /// logged and does not undo the confirmation.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Handled {
        // Reap finished tasks so the set does not grow over a long session.
        while self.tasks.try_join_next().is_some() {}

        match event {
            SessionEvent::RefreshFinished { token, outcome } => {
                let failed = matches!(outcome, RefreshOutcome::Failure { .. });
                match self.feed.apply(token, outcome) {
                    Applied::Stale => Handled::StaleRefresh,
                    Applied::Applied if failed => Handled::RefreshFailed,
                    Applied::Applied => Handled::Refreshed,
                }
            }
            SessionEvent::LikeAcknowledged { intent, result } => {
                let accepted = result.is_ok();
                let resolution = self.likes.resolve(&intent, result);
                if accepted {
                    self.persist_accepted(&intent).await;
                }
                Handled::Like(resolution)
            }
        }
    }

    async fn persist_accepted(&mut self, intent: &LikeIntent) {
        let newer = self
            .persisted
            .get(&intent.bill)
            .map_or(true, |stored| *stored < intent.id);
        if !newer {
            tracing::debug!(bill = %intent.bill, intent = intent.id.get(), "Skipping persist of older acknowledgement");
            return;
        }
        self.persisted.insert(intent.bill, intent.id);
        if let Err(e) = self.store.set_liked(intent.bill, intent.desired).await {
            tracing::warn!(bill = %intent.bill, liked = intent.desired, error = %e, "Failed to persist like");
        }
    }

    /// End the session. In-flight network tasks are aborted; their results
    /// are never delivered.
    pub fn shutdown(mut self) {
        let in_flight = self.tasks.len();
        self.tasks.abort_all();
        tracing::info!(
            in_flight,
            pending_likes = self.likes.pending_count(),
            "Session closed"
        );
    }
}

fn refresh_outcome(result: Result<FeedPayload, FetchError>) -> RefreshOutcome {
    match result {
        Ok(payload) => RefreshOutcome::Success {
            bills: payload.bills,
            representatives: payload.reps,
        },
        Err(e) => RefreshOutcome::Failure {
            reason: RefreshFailure::new(e.to_string()),
        },
    }
}

/// Run `future`, turning a panic into `Err(message)`.
async fn catch_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    })
}
