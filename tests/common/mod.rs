#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use echoes::{
    auth::SignUpForm,
    backend::local::{self, LocalAuth, LocalMediaStore, SqliteGateway},
    client::{Backend, EchoClient},
    model::{NewsItem, NewsSource},
    news::{NewsError, NewsFeed},
    trending::TrendingOptions,
};
use time::OffsetDateTime;
use uuid::Uuid;

pub struct StaticNews(pub Vec<NewsItem>);

#[async_trait]
impl NewsFeed for StaticNews {
    async fn try_top_news(&self, max: usize) -> Result<Vec<NewsItem>, NewsError> {
        Ok(self.0.iter().take(max).cloned().collect())
    }
}

pub fn headline(title: &str) -> NewsItem {
    NewsItem {
        title: title.to_owned(),
        description: format!("about {title}"),
        url: format!("https://news.example.com/{}", title.to_lowercase().replace(' ', "-")),
        published_at: OffsetDateTime::UNIX_EPOCH,
        source: NewsSource { name: "Example News".into() },
    }
}

pub struct Harness {
    pub client: Arc<EchoClient>,
    pub media_dir: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_dir);
    }
}

/// A client on a fresh in-memory database with a fixed news panel.
pub async fn local_client() -> Harness {
    let db_pool = local::connect("sqlite::memory:").await.unwrap();
    let media_dir = std::env::temp_dir().join(format!("echoes-test-{}", Uuid::new_v4()));

    let backend = Backend {
        auth: Arc::new(LocalAuth::new(db_pool.clone()).with_cost(4)),
        gateway: Arc::new(SqliteGateway::new(db_pool)),
        media: Arc::new(LocalMediaStore::new(&media_dir, "http://echoes.test")),
        news: Arc::new(StaticNews(vec![headline("Crabs everywhere")])),
    };
    let options = TrendingOptions {
        interval: Duration::from_millis(50),
        ..TrendingOptions::default()
    };

    Harness {
        client: Arc::new(EchoClient::start(backend, options).await),
        media_dir,
    }
}

pub fn sign_up_form(name: &str) -> SignUpForm {
    SignUpForm {
        email: format!("{name}@example.com"),
        password: "hunter22".into(),
        username: name.to_owned(),
        full_name: name.to_uppercase(),
    }
}

/// Lets background tasks drain queued auth events.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Waits (bounded) until `check` holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
