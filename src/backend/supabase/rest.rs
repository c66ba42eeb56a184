use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::{
    backend::username_conflict,
    error::{EchoError, EchoResult},
    gateway::Gateway,
    model::{FeedRecord, FeedScope, Hashtag, LikeState, Post, PostId, Profile, ProfileUpdate, UserId},
};

use super::{Failure, Supabase, check};

const FEED_SELECT: &str = "*,profiles(id,username,full_name,bio,avatar_url),likes(user_id),comments(id)";

/// PostgREST answers with a bare object instead of a one-element array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Rows of the `tweets`, `likes`, `profiles` and `hashtags` tables.
pub struct RestGateway {
    client: Supabase,
}

mod json_structs {
    use serde::{Deserialize, Serialize, de::IgnoredAny};
    use time::OffsetDateTime;

    use crate::model::{PostId, Profile, UserId};

    #[derive(Deserialize)]
    pub struct TweetRow {
        pub id: PostId,
        pub user_id: UserId,
        pub content: String,
        #[serde(default)]
        pub media_url: Option<Vec<String>>,
        #[serde(with = "time::serde::rfc3339")]
        pub created_at: OffsetDateTime,
        #[serde(default)]
        pub profiles: Option<Profile>,
        #[serde(default)]
        pub likes: Vec<LikeRow>,
        #[serde(default)]
        pub comments: Vec<IgnoredAny>,
    }

    #[derive(Deserialize)]
    pub struct LikeRow {
        pub user_id: UserId,
    }

    #[derive(Serialize)]
    pub struct NewTweet<'a> {
        pub user_id: UserId,
        pub content: &'a str,
        pub media_url: Vec<&'a str>,
    }

    #[derive(Serialize)]
    pub struct NewLike {
        pub user_id: UserId,
        pub tweet_id: PostId,
    }
}

use json_structs::{LikeRow, NewLike, NewTweet, TweetRow};

impl TweetRow {
    fn into_post(self) -> Post {
        Post {
            id: self.id,
            author_id: self.user_id,
            content: self.content,
            media_urls: self.media_url.unwrap_or_default(),
            created_at: self.created_at,
        }
    }

    fn into_record(mut self) -> EchoResult<FeedRecord> {
        let Some(author) = self.profiles.take() else {
            return Err(EchoError::transient(format!("echo {} has no author profile", self.id)));
        };
        let likers = self.likes.drain(..).map(|LikeRow { user_id }| user_id).collect();
        let comment_count = u32::try_from(self.comments.len()).unwrap_or(u32::MAX);

        Ok(FeedRecord {
            post: self.into_post(),
            author,
            likers,
            comment_count,
        })
    }
}

/// Body of a profile PATCH. Blank optional fields are cleared.
fn profile_patch(update: &ProfileUpdate) -> serde_json::Map<String, serde_json::Value> {
    let blank_is_null = |value: &str| match value {
        "" => serde_json::Value::Null,
        value => value.into(),
    };

    let mut patch = serde_json::Map::new();
    if let Some(full_name) = &update.full_name {
        patch.insert("full_name".into(), full_name.as_str().into());
    }
    if let Some(bio) = &update.bio {
        patch.insert("bio".into(), blank_is_null(bio));
    }
    if let Some(avatar_url) = &update.avatar_url {
        patch.insert("avatar_url".into(), blank_is_null(avatar_url));
    }
    patch
}

fn eq(id: impl std::fmt::Display) -> String {
    format!("eq.{id}")
}

impl RestGateway {
    pub fn new(client: Supabase) -> Self {
        Self { client }
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client.request(method, &format!("/rest/v1/{table}"))
    }

    async fn single<T: DeserializeOwned>(request: RequestBuilder) -> EchoResult<T> {
        let resp = check(request.header("Accept", SINGLE_OBJECT).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn write_profile(&self, profile: Profile, prefer: &str) -> EchoResult<Profile> {
        let request = self
            .table(Method::POST, "profiles")
            .header("Prefer", prefer)
            .json(&profile);

        Self::single(request)
            .await
            .map_err(|e| username_conflict(e, &profile.username))
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn create_post(
        &self,
        author_id: UserId,
        content: &str,
        media_url: Option<&str>,
    ) -> EchoResult<Post> {
        let request = self
            .table(Method::POST, "tweets")
            .header("Prefer", "return=representation")
            .json(&NewTweet {
                user_id: author_id,
                content,
                media_url: media_url.into_iter().collect(),
            });

        let row: TweetRow = Self::single(request).await?;
        tracing::debug!(post_id = %row.id, %author_id, "echo stored");
        Ok(row.into_post())
    }

    async fn list_feed(&self, scope: FeedScope) -> EchoResult<Vec<FeedRecord>> {
        let mut request = self
            .table(Method::GET, "tweets")
            .query(&[("select", FEED_SELECT), ("order", "created_at.desc")]);
        if let FeedScope::ByAuthor(author_id) = scope {
            request = request.query(&[("user_id", eq(author_id))]);
        }

        let rows: Vec<TweetRow> = check(request.send().await?).await?.json().await?;
        rows.into_iter().map(TweetRow::into_record).collect()
    }

    async fn toggle_like(&self, user_id: UserId, post_id: PostId, desired: LikeState) -> EchoResult<()> {
        let request = match desired {
            LikeState::Liked => self
                .table(Method::POST, "likes")
                .query(&[("on_conflict", "user_id,tweet_id")])
                .header("Prefer", "resolution=ignore-duplicates,return=minimal")
                .json(&NewLike { user_id, tweet_id: post_id }),
            LikeState::Unliked => self
                .table(Method::DELETE, "likes")
                .query(&[("user_id", eq(user_id)), ("tweet_id", eq(post_id))]),
        };

        check(request.send().await?).await?;
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> EchoResult<Option<Profile>> {
        let resp = self
            .table(Method::GET, "profiles")
            .query(&[("select", "*".to_owned()), ("id", eq(id))])
            .header("Accept", SINGLE_OBJECT)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(Some(resp.json().await?));
        }
        let failure = Failure::read(resp).await;
        if failure.is_not_found() {
            return Ok(None);
        }
        Err(failure.into_error())
    }

    async fn create_profile(&self, profile: Profile) -> EchoResult<Profile> {
        let created = self.write_profile(profile, "return=representation").await?;
        tracing::info!(user_id = %created.id, username = %created.username, "profile created");
        Ok(created)
    }

    async fn upsert_profile(&self, profile: Profile) -> EchoResult<Profile> {
        self.write_profile(profile, "resolution=merge-duplicates,return=representation")
            .await
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> EchoResult<Profile> {
        let patch = profile_patch(&update);
        if patch.is_empty() {
            return self
                .get_profile(id)
                .await?
                .ok_or_else(|| EchoError::validation("profile does not exist"));
        }

        let resp = self
            .table(Method::PATCH, "profiles")
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT)
            .json(&patch)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(resp.json().await?);
        }
        let failure = Failure::read(resp).await;
        if failure.is_not_found() {
            return Err(EchoError::validation("profile does not exist"));
        }
        Err(failure.into_error())
    }

    async fn trending_hashtags(&self, limit: usize) -> EchoResult<Vec<Hashtag>> {
        let request = self.table(Method::GET, "hashtags").query(&[
            ("select", "name,tweet_count".to_owned()),
            ("order", "tweet_count.desc".to_owned()),
            ("limit", limit.to_string()),
        ]);

        Ok(check(request.send().await?).await?.json().await?)
    }
}
