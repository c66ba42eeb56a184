//! In-memory gateway for unit tests.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    error::{EchoError, EchoResult},
    gateway::Gateway,
    model::{FeedRecord, FeedScope, Hashtag, LikeState, Post, PostId, Profile, ProfileUpdate, UserId},
};

#[derive(Default)]
pub(crate) struct MemoryGateway {
    pub likes: Mutex<HashSet<(UserId, PostId)>>,
    pub hashtags: Mutex<Vec<Hashtag>>,
    pub fail_likes: AtomicBool,
    pub fail_hashtags: AtomicBool,
    pub like_calls: AtomicUsize,
    pub hashtag_calls: AtomicUsize,
    like_gate: Option<Arc<Notify>>,
}

impl MemoryGateway {
    /// Every `toggle_like` waits for a notification before answering.
    pub fn gate_likes(mut self, gate: Arc<Notify>) -> Self {
        self.like_gate = Some(gate);
        self
    }

    pub fn with_hashtags(self, hashtags: Vec<Hashtag>) -> Self {
        *self.hashtags.lock().unwrap() = hashtags;
        self
    }
}

fn unsupported<T>() -> EchoResult<T> {
    Err(EchoError::transient("not supported by MemoryGateway"))
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn create_post(&self, _: UserId, _: &str, _: Option<&str>) -> EchoResult<Post> {
        unsupported()
    }

    async fn list_feed(&self, _: FeedScope) -> EchoResult<Vec<FeedRecord>> {
        unsupported()
    }

    async fn toggle_like(&self, user_id: UserId, post_id: PostId, desired: LikeState) -> EchoResult<()> {
        self.like_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.like_gate {
            gate.notified().await;
        }
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(EchoError::transient("likes table unreachable"));
        }

        let mut likes = self.likes.lock().unwrap();
        match desired {
            LikeState::Liked => likes.insert((user_id, post_id)),
            LikeState::Unliked => likes.remove(&(user_id, post_id)),
        };
        Ok(())
    }

    async fn get_profile(&self, _: UserId) -> EchoResult<Option<Profile>> {
        Ok(None)
    }

    async fn create_profile(&self, profile: Profile) -> EchoResult<Profile> {
        Ok(profile)
    }

    async fn upsert_profile(&self, profile: Profile) -> EchoResult<Profile> {
        Ok(profile)
    }

    async fn update_profile(&self, _: UserId, _: ProfileUpdate) -> EchoResult<Profile> {
        unsupported()
    }

    async fn trending_hashtags(&self, limit: usize) -> EchoResult<Vec<Hashtag>> {
        self.hashtag_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_hashtags.load(Ordering::SeqCst) {
            return Err(EchoError::transient("hashtags table unreachable"));
        }
        Ok(self.hashtags.lock().unwrap().iter().take(limit).cloned().collect())
    }
}
