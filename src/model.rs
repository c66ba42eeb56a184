use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type UserId = Uuid;
pub type PostId = Uuid;

/// The signed-in account as the auth provider knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Fields an owner may change on their profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(full_name) = &self.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(bio) = &self.bio {
            profile.bio = Some(bio.clone()).filter(|b| !b.is_empty());
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = Some(avatar_url.clone()).filter(|u| !u.is_empty());
        }
    }
}

/// An echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    Liked,
    Unliked,
}

impl LikeState {
    pub fn is_liked(self) -> bool {
        self == LikeState::Liked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashtag {
    pub name: String,
    pub tweet_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "publishedAt", with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    pub source: NewsSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "author_id")]
pub enum FeedScope {
    Global,
    ByAuthor(UserId),
}

/// A post as the store returns it from the joined feed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub post: Post,
    pub author: Profile,
    pub likers: Vec<UserId>,
    pub comment_count: u32,
}

/// A post as presentation displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub post: Post,
    pub author: Profile,
    pub like_count: u32,
    pub comment_count: u32,
    pub liked_by_current_user: bool,
}

impl FeedEntry {
    pub fn from_record(record: FeedRecord, viewer: Option<&Identity>) -> Self {
        let liked_by_current_user =
            viewer.is_some_and(|viewer| record.likers.contains(&viewer.id));

        FeedEntry {
            like_count: u32::try_from(record.likers.len()).unwrap_or(u32::MAX),
            comment_count: record.comment_count,
            liked_by_current_user,
            post: record.post,
            author: record.author,
        }
    }
}
