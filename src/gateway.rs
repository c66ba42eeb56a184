//! Typed access to the remote store.
//!
//! Every call is a single round trip with no retry and no caching; callers
//! decide what to do with a failure (see [`crate::error::policy`]).

use async_trait::async_trait;

use crate::{
    error::{EchoError, EchoResult},
    model::{FeedRecord, FeedScope, Hashtag, LikeState, Post, PostId, Profile, ProfileUpdate, UserId},
};

pub const MAX_CONTENT_CHARS: usize = 280;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Stores a new echo. Content must already have passed [`validate_content`].
    async fn create_post(
        &self,
        author_id: UserId,
        content: &str,
        media_url: Option<&str>,
    ) -> EchoResult<Post>;

    /// Posts in `scope` joined with author, likers and comment count, newest first.
    async fn list_feed(&self, scope: FeedScope) -> EchoResult<Vec<FeedRecord>>;

    /// Brings the (user, post) like to `desired`. Already being there is a no-op.
    async fn toggle_like(&self, user_id: UserId, post_id: PostId, desired: LikeState)
    -> EchoResult<()>;

    /// `Ok(None)` means there is no such profile.
    async fn get_profile(&self, id: UserId) -> EchoResult<Option<Profile>>;

    async fn create_profile(&self, profile: Profile) -> EchoResult<Profile>;

    async fn upsert_profile(&self, profile: Profile) -> EchoResult<Profile>;

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> EchoResult<Profile>;

    /// Highest `tweet_count` first.
    async fn trending_hashtags(&self, limit: usize) -> EchoResult<Vec<Hashtag>>;
}

/// Checks echo content before it may reach [`Gateway::create_post`].
/// Length is counted in code points. The content is never trimmed.
pub fn validate_content(content: &str) -> EchoResult<()> {
    if content.is_empty() {
        return Err(EchoError::validation("echo content is empty"));
    }

    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(EchoError::validation(format!(
            "echo content is {chars} characters, the limit is {MAX_CONTENT_CHARS}"
        )));
    }

    Ok(())
}

/// Validates and then creates. The gateway is not called for invalid content.
pub async fn post_echo(
    gateway: &dyn Gateway,
    author_id: UserId,
    content: &str,
    media_url: Option<&str>,
) -> EchoResult<Post> {
    validate_content(content)?;
    gateway.create_post(author_id, content, media_url).await
}
