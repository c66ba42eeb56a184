//! Top headlines from the external news provider.
//!
//! News is supplementary: [`NewsFeed::fetch_top_news`] never fails, anything
//! that goes wrong is logged and turns into an empty list.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    error::{Operation, absorb},
    model::{NewsItem, NewsSource},
};

pub const DEFAULT_BASE_URL: &str = "https://gnews.io/api/v4";

#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Headlines, or why there are none.
    async fn try_top_news(&self, max: usize) -> Result<Vec<NewsItem>, NewsError>;

    /// Headlines, or an empty list when anything went wrong.
    async fn fetch_top_news(&self, max: usize) -> Vec<NewsItem> {
        match absorb(Operation::TopNews, self.try_top_news(max).await) {
            Ok(items) => items.unwrap_or_default(),
            Err(err) => {
                tracing::error!("failed to fetch news: {err}");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("news provider answered {0}")]
    Status(StatusCode),
    #[error("news payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("news article {index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub base_url: String,
    pub api_key: String,
    pub lang: String,
    /// How long a successful fetch is served from memory.
    pub cache_ttl: Duration,
}

impl NewsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            lang: "en".to_owned(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

struct CachedNews {
    fetched_at: Instant,
    max: usize,
    items: Vec<NewsItem>,
}

#[derive(Clone)]
pub struct NewsClient {
    http: reqwest::Client,
    config: Arc<NewsConfig>,
    // held across the fetch: concurrent callers wait for the in-flight one
    cache: Arc<Mutex<Option<CachedNews>>>,
}

mod json_structs {
    use serde::Deserialize;

    #[derive(Deserialize)]
    pub struct RawHeadlines {
        pub articles: Vec<RawArticle>,
    }
    #[derive(Deserialize)]
    pub struct RawArticle {
        pub title: String,
        pub description: String,
        pub url: String,
        #[serde(rename = "publishedAt")]
        pub published_at: String,
        pub source: RawSource,
    }
    #[derive(Deserialize)]
    pub struct RawSource {
        pub name: String,
    }
}

impl NewsClient {
    pub fn new(config: NewsConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    pub fn with_http(http: reqwest::Client, config: NewsConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Up to `max` headlines, served from cache while it is fresh.
    /// Failures are not cached.
    async fn cached_top_news(&self, max: usize) -> Result<Vec<NewsItem>, NewsError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.max == max && cached.fetched_at.elapsed() < self.config.cache_ttl {
                tracing::debug!(age = ?cached.fetched_at.elapsed(), "serving cached news");
                return Ok(cached.items.clone());
            }
        }

        let items = self.fetch(max).await?;
        tracing::debug!(count = items.len(), "fetched news");
        *cache = Some(CachedNews {
            fetched_at: Instant::now(),
            max,
            items: items.clone(),
        });
        Ok(items)
    }

    async fn fetch(&self, max: usize) -> Result<Vec<NewsItem>, NewsError> {
        let res = self
            .http
            .get(format!("{}/top-headlines", self.config.base_url))
            .query(&[
                ("lang", self.config.lang.clone()),
                ("max", max.to_string()),
                ("apikey", self.config.api_key.clone()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(NewsError::Status(res.status()));
        }

        let text = res.text().await?;
        parse_headlines(&text)
    }
}

#[async_trait]
impl NewsFeed for NewsClient {
    async fn try_top_news(&self, max: usize) -> Result<Vec<NewsItem>, NewsError> {
        self.cached_top_news(max).await
    }
}

/// Parses a provider payload. One invalid article rejects the whole payload.
pub fn parse_headlines(body: &str) -> Result<Vec<NewsItem>, NewsError> {
    let raw: json_structs::RawHeadlines = serde_json::from_str(body)?;

    raw.articles
        .into_iter()
        .enumerate()
        .map(|(index, article)| {
            let invalid = |reason: String| NewsError::Invalid { index, reason };

            let url = Url::parse(&article.url).map_err(|e| invalid(format!("url: {e}")))?;
            let published_at = OffsetDateTime::parse(&article.published_at, &Rfc3339)
                .map_err(|e| invalid(format!("publishedAt: {e}")))?;

            Ok(NewsItem {
                title: article.title,
                description: article.description,
                url: url.into(),
                published_at,
                source: NewsSource {
                    name: article.source.name,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"{
        "title": "Crabs everywhere",
        "description": "A look at crustaceans",
        "url": "https://news.example.com/crabs",
        "publishedAt": "2024-05-01T10:00:00Z",
        "source": { "name": "Example News" }
    }"#;

    #[test]
    fn parses_valid_articles() {
        let body = format!(r#"{{ "totalArticles": 1, "articles": [{ARTICLE}] }}"#);
        let items = parse_headlines(&body).unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source.name, "Example News");
        assert_eq!(items[0].url, "https://news.example.com/crabs");
        assert_eq!(items[0].published_at.year(), 2024);
    }

    #[test]
    fn missing_source_name_rejects_payload() {
        let body = r#"{ "articles": [{
            "title": "t", "description": "d", "url": "https://a.example/x",
            "publishedAt": "2024-05-01T10:00:00Z", "source": {}
        }] }"#;

        assert!(matches!(parse_headlines(body), Err(NewsError::Payload(_))));
    }

    #[test]
    fn relative_url_rejects_payload() {
        let body = format!(
            r#"{{ "articles": [{ARTICLE}, {{
                "title": "t", "description": "d", "url": "/relative",
                "publishedAt": "2024-05-01T10:00:00Z", "source": {{ "name": "n" }}
            }}] }}"#
        );

        assert!(matches!(parse_headlines(&body), Err(NewsError::Invalid { index: 1, .. })));
    }

    #[test]
    fn unparseable_timestamp_rejects_payload() {
        let body = r#"{ "articles": [{
            "title": "t", "description": "d", "url": "https://a.example/x",
            "publishedAt": "yesterday", "source": { "name": "n" }
        }] }"#;

        assert!(matches!(parse_headlines(body), Err(NewsError::Invalid { index: 0, .. })));
    }
}
