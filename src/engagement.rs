//! Optimistic like/unlike with rollback.
//!
//! Every (user, echo) pair moves through
//!
//! ```text
//! Unliked --like--> Liking --ok--> Liked --unlike--> Unliking --ok--> Unliked
//!                     |                                 |
//!                     +--err--> Unliked     Liked <--err--+
//! ```
//!
//! The displayed count and flag change as soon as a toggle begins and are
//! restored exactly if the commit fails. While a commit is outstanding the
//! pair accepts no other toggle. Counts are only re-synchronized with the
//! server by [`Reconciler::seed`] after a feed refresh.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    error::EchoError,
    gateway::Gateway,
    model::{FeedEntry, Identity, LikeState, PostId, UserId},
    session::SessionStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementState {
    Unliked,
    Liking,
    Liked,
    Unliking,
}

impl EngagementState {
    fn settled(liked: bool) -> Self {
        if liked { Self::Liked } else { Self::Unliked }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::Liking | Self::Unliking)
    }

    /// Whether presentation shows the heart filled.
    pub fn shows_liked(self) -> bool {
        matches!(self, Self::Liking | Self::Liked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngagementView {
    pub state: EngagementState,
    pub like_count: u32,
}

impl EngagementView {
    pub fn liked(&self) -> bool {
        self.state.shows_liked()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ToggleRejected {
    #[error("not signed in")]
    SignedOut,
    #[error("echo is not part of the displayed feed")]
    Unknown,
    #[error("a like for this echo is still being saved")]
    Pending,
    #[error("echo is already {0:?}")]
    Unchanged(LikeState),
}

#[derive(Debug, Error)]
pub enum ToggleError {
    #[error(transparent)]
    Rejected(#[from] ToggleRejected),
    #[error("failed to save like: {0}")]
    Commit(#[source] EchoError),
    /// The commit went through, but the echo stopped being displayed while it
    /// was in flight. There is no local count left to report.
    #[error("echo was {0:?} after it left the displayed feed")]
    Detached(LikeState),
}

/// User-visible failure report, e.g. for a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub post_id: PostId,
    pub message: String,
}

/// Proof that a toggle began. Hand it back to [`Reconciler::settle`].
#[derive(Debug)]
#[must_use = "a pending toggle has to be settled"]
pub struct PendingToggle {
    pub user_id: UserId,
    pub post_id: PostId,
    pub desired: LikeState,
    ticket: u64,
}

struct Pair {
    state: EngagementState,
    like_count: u32,
    pending: Option<Rollback>,
}

struct Rollback {
    ticket: u64,
    state: EngagementState,
    like_count: u32,
}

#[derive(Default)]
struct Pairs {
    by_key: HashMap<(UserId, PostId), Pair>,
    next_ticket: u64,
}

pub struct Reconciler {
    gateway: Arc<dyn Gateway>,
    session: SessionStore,
    pairs: Mutex<Pairs>,
    notices: broadcast::Sender<Notice>,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionStore) -> Self {
        Self {
            gateway,
            session,
            pairs: Mutex::new(Pairs::default()),
            notices: broadcast::channel(16).0,
        }
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Installs the authoritative counts of a freshly refreshed feed.
    /// Pairs with an outstanding commit keep their optimistic view.
    pub fn seed(&self, viewer: Option<&Identity>, entries: &[FeedEntry]) {
        let Some(viewer) = viewer else {
            return;
        };

        let mut pairs = self.lock();
        for entry in entries {
            let pair = pairs.by_key.entry((viewer.id, entry.post.id)).or_insert(Pair {
                state: EngagementState::Unliked,
                like_count: 0,
                pending: None,
            });
            if pair.pending.is_some() {
                continue;
            }
            pair.state = EngagementState::settled(entry.liked_by_current_user);
            pair.like_count = entry.like_count;
        }
    }

    /// What the current user should see for `post_id`.
    pub fn view(&self, post_id: PostId) -> Option<EngagementView> {
        let user = self.session.identity()?;
        self.lock()
            .by_key
            .get(&(user.id, post_id))
            .map(|pair| EngagementView {
                state: pair.state,
                like_count: pair.like_count,
            })
    }

    /// `entries` with counts and flags replaced by the current user's view.
    pub fn overlay(&self, entries: &[FeedEntry]) -> Vec<FeedEntry> {
        entries
            .iter()
            .cloned()
            .map(|mut entry| {
                if let Some(view) = self.view(entry.post.id) {
                    entry.like_count = view.like_count;
                    entry.liked_by_current_user = view.liked();
                }
                entry
            })
            .collect()
    }

    /// Applies the optimistic half of a toggle.
    pub fn begin(&self, post_id: PostId, desired: LikeState) -> Result<PendingToggle, ToggleRejected> {
        let user = self.session.identity().ok_or(ToggleRejected::SignedOut)?;

        let mut pairs = self.lock();
        let ticket = pairs.next_ticket;
        pairs.next_ticket += 1;

        let pair = pairs
            .by_key
            .get_mut(&(user.id, post_id))
            .ok_or(ToggleRejected::Unknown)?;

        if pair.state.is_pending() {
            return Err(ToggleRejected::Pending);
        }
        if pair.state.shows_liked() == desired.is_liked() {
            return Err(ToggleRejected::Unchanged(desired));
        }

        pair.pending = Some(Rollback {
            ticket,
            state: pair.state,
            like_count: pair.like_count,
        });
        match desired {
            LikeState::Liked => {
                pair.state = EngagementState::Liking;
                pair.like_count += 1;
            }
            LikeState::Unliked => {
                pair.state = EngagementState::Unliking;
                pair.like_count = pair.like_count.saturating_sub(1);
            }
        }

        Ok(PendingToggle {
            user_id: user.id,
            post_id,
            desired,
            ticket,
        })
    }

    /// Applies the commit outcome. Returns `None` when the toggle is no longer
    /// relevant (the view was detached or reseeded), in which case nothing changes.
    pub fn settle(&self, pending: PendingToggle, result: Result<(), EchoError>) -> Option<EngagementView> {
        let mut pairs = self.lock();
        let Some(pair) = pairs.by_key.get_mut(&(pending.user_id, pending.post_id)) else {
            tracing::debug!(post_id = %pending.post_id, "discarding like result for detached echo");
            return None;
        };
        let Some(rollback) = pair.pending.take_if(|r| r.ticket == pending.ticket) else {
            tracing::debug!(post_id = %pending.post_id, "discarding stale like result");
            return None;
        };

        match result {
            Ok(()) => {
                pair.state = EngagementState::settled(pending.desired.is_liked());
            }
            Err(err) => {
                pair.state = rollback.state;
                pair.like_count = rollback.like_count;

                tracing::warn!(post_id = %pending.post_id, "like commit failed, rolled back: {err}");
                let message = match pending.desired {
                    LikeState::Liked => "Failed to like echo",
                    LikeState::Unliked => "Failed to unlike echo",
                };
                let _ = self.notices.send(Notice {
                    post_id: pending.post_id,
                    message: message.to_owned(),
                });
            }
        }

        Some(EngagementView {
            state: pair.state,
            like_count: pair.like_count,
        })
    }

    /// begin, commit through the gateway, settle.
    pub async fn set_liked(&self, post_id: PostId, desired: LikeState) -> Result<EngagementView, ToggleError> {
        let pending = self.begin(post_id, desired)?;
        let result = self
            .gateway
            .toggle_like(pending.user_id, post_id, desired)
            .await;
        let failure = result.as_ref().err().cloned();

        let view = self.settle(pending, result);
        if let Some(err) = failure {
            return Err(ToggleError::Commit(err));
        }

        view.ok_or(ToggleError::Detached(desired))
    }

    pub async fn like(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        self.set_liked(post_id, LikeState::Liked).await
    }

    pub async fn unlike(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        self.set_liked(post_id, LikeState::Unliked).await
    }

    /// Likes if the echo is shown unliked and vice versa.
    pub async fn toggle(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        let current = self.view(post_id).ok_or(ToggleRejected::Unknown)?;
        let desired = if current.liked() {
            LikeState::Unliked
        } else {
            LikeState::Liked
        };
        self.set_liked(post_id, desired).await
    }

    /// Forgets every pair; results of commits still in flight are discarded.
    pub fn detach(&self) {
        self.lock().by_key.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Pairs> {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
