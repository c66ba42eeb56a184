use async_trait::async_trait;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    backend::username_conflict,
    error::{EchoError, EchoResult},
    gateway::Gateway,
    model::{FeedRecord, FeedScope, Hashtag, LikeState, Post, PostId, Profile, ProfileUpdate, UserId},
};

use super::parse_id;

#[derive(Clone)]
pub struct SqliteGateway {
    db_pool: SqlitePool,
}

type ProfileRow = (String, String, String, Option<String>, Option<String>);

type FeedRow = (
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

const FEED_QUERY: &str = r#"
SELECT e.id, e.author_id, e.content, e.media_urls, e.created_at,
       p.username, p.full_name, p.bio, p.avatar_url,
       (SELECT group_concat(l.user_id) FROM likes l WHERE l.post_id = e.id),
       (SELECT COUNT(*) FROM comments c WHERE c.post_id = e.id)
FROM echoes e
JOIN profiles p ON p.id = e.author_id
WHERE (? IS NULL OR e.author_id = ?)
ORDER BY e.created_at DESC, e.rowid DESC
"#;

impl SqliteGateway {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

fn to_nanos(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos()).unwrap_or(i64::MAX)
}

fn from_nanos(nanos: i64) -> EchoResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).map_err(EchoError::transient)
}

fn profile_from_row((id, username, full_name, bio, avatar_url): ProfileRow) -> EchoResult<Profile> {
    Ok(Profile {
        id: parse_id(&id)?,
        username,
        full_name,
        bio,
        avatar_url,
    })
}

fn record_from_row(row: FeedRow) -> EchoResult<FeedRecord> {
    let (id, author_id, content, media_urls, created_at, username, full_name, bio, avatar_url, likers, comments) =
        row;
    let author_id = parse_id(&author_id)?;

    let likers = likers
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .collect::<EchoResult<Vec<_>>>()?;

    Ok(FeedRecord {
        post: Post {
            id: parse_id(&id)?,
            author_id,
            content,
            media_urls: serde_json::from_str(&media_urls).map_err(EchoError::transient)?,
            created_at: from_nanos(created_at)?,
        },
        author: Profile {
            id: author_id,
            username,
            full_name,
            bio,
            avatar_url,
        },
        likers,
        comment_count: u32::try_from(comments).unwrap_or_default(),
    })
}

/// Lowercased `#tags` of an echo, without the `#`, each once.
pub(crate) fn extract_hashtags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in content.split_whitespace() {
        let Some(tag) = word.strip_prefix('#') else {
            continue;
        };
        let tag: String = tag
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .flat_map(char::to_lowercase)
            .collect();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn create_post(
        &self,
        author_id: UserId,
        content: &str,
        media_url: Option<&str>,
    ) -> EchoResult<Post> {
        let post = Post {
            id: Uuid::now_v7(),
            author_id,
            content: content.to_owned(),
            media_urls: media_url.map(str::to_owned).into_iter().collect(),
            created_at: OffsetDateTime::now_utc(),
        };

        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT INTO echoes (id,author_id,content,media_urls,created_at) VALUES (?,?,?,?,?)")
            .bind(post.id.to_string())
            .bind(author_id.to_string())
            .bind(&post.content)
            .bind(serde_json::to_string(&post.media_urls).map_err(EchoError::transient)?)
            .bind(to_nanos(post.created_at))
            .execute(&mut *tx)
            .await?;

        for tag in extract_hashtags(content) {
            sqlx::query(
                "INSERT INTO hashtags (name,tweet_count) VALUES (?,1) \
                 ON CONFLICT(name) DO UPDATE SET tweet_count = tweet_count + 1",
            )
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(post_id = %post.id, %author_id, "echo stored");
        Ok(post)
    }

    async fn list_feed(&self, scope: FeedScope) -> EchoResult<Vec<FeedRecord>> {
        let author = match scope {
            FeedScope::Global => None,
            FeedScope::ByAuthor(id) => Some(id.to_string()),
        };

        sqlx::query_as::<_, FeedRow>(FEED_QUERY)
            .bind(&author)
            .bind(&author)
            .fetch_all(&self.db_pool)
            .await?
            .into_iter()
            .map(record_from_row)
            .collect()
    }

    async fn toggle_like(&self, user_id: UserId, post_id: PostId, desired: LikeState) -> EchoResult<()> {
        let query = match desired {
            LikeState::Liked => "INSERT INTO likes (user_id,post_id) VALUES (?,?) ON CONFLICT DO NOTHING",
            LikeState::Unliked => "DELETE FROM likes WHERE user_id=? AND post_id=?",
        };
        sqlx::query(query)
            .bind(user_id.to_string())
            .bind(post_id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn get_profile(&self, id: UserId) -> EchoResult<Option<Profile>> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id,username,full_name,bio,avatar_url FROM profiles WHERE id=?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db_pool)
        .await?
        .map(profile_from_row)
        .transpose()
    }

    async fn create_profile(&self, profile: Profile) -> EchoResult<Profile> {
        sqlx::query("INSERT INTO profiles (id,username,full_name,bio,avatar_url) VALUES (?,?,?,?,?)")
            .bind(profile.id.to_string())
            .bind(&profile.username)
            .bind(&profile.full_name)
            .bind(&profile.bio)
            .bind(&profile.avatar_url)
            .execute(&self.db_pool)
            .await
            .map_err(|e| username_conflict(e.into(), &profile.username))?;

        tracing::info!(user_id = %profile.id, username = %profile.username, "profile created");
        Ok(profile)
    }

    async fn upsert_profile(&self, profile: Profile) -> EchoResult<Profile> {
        sqlx::query(
            "INSERT INTO profiles (id,username,full_name,bio,avatar_url) VALUES (?,?,?,?,?) \
             ON CONFLICT(id) DO UPDATE SET username=excluded.username, full_name=excluded.full_name, \
             bio=excluded.bio, avatar_url=excluded.avatar_url",
        )
        .bind(profile.id.to_string())
        .bind(&profile.username)
        .bind(&profile.full_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .execute(&self.db_pool)
        .await
        .map_err(|e| username_conflict(e.into(), &profile.username))?;

        Ok(profile)
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> EchoResult<Profile> {
        let Some(mut profile) = self.get_profile(id).await? else {
            return Err(EchoError::validation("profile does not exist"));
        };
        update.apply(&mut profile);

        sqlx::query("UPDATE profiles SET full_name=?, bio=?, avatar_url=? WHERE id=?")
            .bind(&profile.full_name)
            .bind(&profile.bio)
            .bind(&profile.avatar_url)
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;

        Ok(profile)
    }

    async fn trending_hashtags(&self, limit: usize) -> EchoResult<Vec<Hashtag>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name,tweet_count FROM hashtags ORDER BY tweet_count DESC, rowid LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, tweet_count)| Hashtag { name, tweet_count })
            .collect())
    }
}
