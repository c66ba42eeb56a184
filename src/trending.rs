use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    error::{Operation, absorb},
    gateway::Gateway,
    model::{Hashtag, NewsItem},
    news::NewsFeed,
};

#[derive(Debug, Clone)]
pub struct TrendingOptions {
    pub interval: Duration,
    pub hashtag_limit: usize,
    pub news_max: usize,
}

impl Default for TrendingOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            hashtag_limit: 5,
            news_max: 5,
        }
    }
}

/// Refreshes the trending hashtags and the news panel in the background.
///
/// Both sources are fetched independently every cycle: a failing source
/// keeps its previously displayed list and does not hold back the other one.
pub struct TrendingPoller;

impl TrendingPoller {
    /// Starts polling: one cycle right away, then one per `options.interval`.
    /// Polling stops when the returned handle is dropped.
    pub fn activate(
        gateway: Arc<dyn Gateway>,
        news: Arc<dyn NewsFeed>,
        options: TrendingOptions,
    ) -> TrendingHandle {
        let (hashtags_tx, hashtags) = watch::channel(Vec::new());
        let (news_tx, headlines) = watch::channel(Vec::new());

        let task = tokio::spawn(async move {
            let mut ticks = time::interval(options.interval);
            // a cycle never overlaps the next one, late ticks are dropped
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticks.tick().await;
                run_cycle(&*gateway, &*news, &options, &hashtags_tx, &news_tx).await;
            }
        });

        TrendingHandle {
            task,
            hashtags,
            news: headlines,
        }
    }
}

async fn run_cycle(
    gateway: &dyn Gateway,
    news: &dyn NewsFeed,
    options: &TrendingOptions,
    hashtags_tx: &watch::Sender<Vec<Hashtag>>,
    news_tx: &watch::Sender<Vec<NewsItem>>,
) {
    let (hashtags, headlines) = tokio::join!(
        gateway.trending_hashtags(options.hashtag_limit),
        news.try_top_news(options.news_max),
    );

    publish(Operation::TrendingHashtags, hashtags, hashtags_tx);
    publish(Operation::TopNews, headlines, news_tx);
}

/// Shows a fresh list. A fail-soft failure keeps the displayed one, a
/// fail-hard one empties the panel.
fn publish<T, E: fmt::Display>(op: Operation, result: Result<Vec<T>, E>, tx: &watch::Sender<Vec<T>>) {
    match absorb(op, result) {
        Ok(Some(items)) => {
            tracing::debug!(?op, count = items.len(), "panel refreshed");
            tx.send_replace(items);
        }
        Ok(None) => tracing::debug!(?op, "keeping previous panel"),
        Err(err) => {
            tracing::error!(?op, "clearing panel: {err}");
            tx.send_replace(Vec::new());
        }
    }
}

pub struct TrendingHandle {
    task: JoinHandle<()>,
    hashtags: watch::Receiver<Vec<Hashtag>>,
    news: watch::Receiver<Vec<NewsItem>>,
}

impl TrendingHandle {
    pub fn hashtags(&self) -> watch::Receiver<Vec<Hashtag>> {
        self.hashtags.clone()
    }

    pub fn news(&self) -> watch::Receiver<Vec<NewsItem>> {
        self.news.clone()
    }

    pub fn deactivate(self) {}
}

impl Drop for TrendingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use ::time::OffsetDateTime;

    use super::*;
    use crate::{
        model::NewsSource,
        news::NewsError,
        testing::MemoryGateway,
    };

    #[derive(Default)]
    struct ScriptedNews {
        items: Mutex<Vec<NewsItem>>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NewsFeed for ScriptedNews {
        async fn try_top_news(&self, max: usize) -> Result<Vec<NewsItem>, NewsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(NewsError::Status(StatusCode::BAD_GATEWAY));
            }
            Ok(self.items.lock().unwrap().iter().take(max).cloned().collect())
        }
    }

    fn headline(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_owned(),
            description: "desc".into(),
            url: "https://news.example.com/a".into(),
            published_at: OffsetDateTime::UNIX_EPOCH,
            source: NewsSource { name: "Example".into() },
        }
    }

    fn hashtag(name: &str, tweet_count: i64) -> Hashtag {
        Hashtag { name: name.to_owned(), tweet_count }
    }

    const PAST_NEXT_TICK: Duration = Duration::from_secs(301);

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately() {
        let gateway = Arc::new(MemoryGateway::default().with_hashtags(vec![hashtag("rust", 9)]));
        let news = Arc::new(ScriptedNews::default());
        *news.items.lock().unwrap() = vec![headline("first")];

        let handle = TrendingPoller::activate(gateway.clone(), news.clone(), TrendingOptions::default());
        let mut hashtags = handle.hashtags();
        hashtags.changed().await.unwrap();

        assert_eq!(hashtags.borrow()[0].name, "rust");
        assert_eq!(gateway.hashtag_calls.load(Ordering::SeqCst), 1);
        assert_eq!(news.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hashtag_failure_does_not_block_news() {
        let gateway = Arc::new(MemoryGateway::default().with_hashtags(vec![hashtag("rust", 9)]));
        let news = Arc::new(ScriptedNews::default());
        *news.items.lock().unwrap() = vec![headline("first")];
        let handle = TrendingPoller::activate(gateway.clone(), news.clone(), TrendingOptions::default());
        time::sleep(Duration::from_secs(1)).await;

        gateway.fail_hashtags.store(true, Ordering::SeqCst);
        *news.items.lock().unwrap() = vec![headline("second")];
        time::sleep(PAST_NEXT_TICK).await;

        assert_eq!(gateway.hashtag_calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.hashtags().borrow().clone(), vec![hashtag("rust", 9)]);
        assert_eq!(handle.news().borrow()[0].title, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn news_failure_does_not_block_hashtags() {
        let gateway = Arc::new(MemoryGateway::default().with_hashtags(vec![hashtag("rust", 9)]));
        let news = Arc::new(ScriptedNews::default());
        *news.items.lock().unwrap() = vec![headline("first")];
        let handle = TrendingPoller::activate(gateway.clone(), news.clone(), TrendingOptions::default());
        time::sleep(Duration::from_secs(1)).await;

        news.fail.store(true, Ordering::SeqCst);
        *gateway.hashtags.lock().unwrap() = vec![hashtag("crabs", 12), hashtag("rust", 9)];
        time::sleep(PAST_NEXT_TICK).await;

        assert_eq!(news.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.news().borrow()[0].title, "first");
        assert_eq!(handle.hashtags().borrow()[0].name, "crabs");
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_news_payload_leaves_panel_empty_and_keeps_polling() {
        let gateway = Arc::new(MemoryGateway::default());
        let news = Arc::new(ScriptedNews::default());
        news.fail.store(true, Ordering::SeqCst);
        let handle = TrendingPoller::activate(gateway.clone(), news.clone(), TrendingOptions::default());

        time::sleep(PAST_NEXT_TICK).await;

        assert!(handle.news().borrow().is_empty());
        assert_eq!(news.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let gateway = Arc::new(MemoryGateway::default());
        let news = Arc::new(ScriptedNews::default());
        let handle = TrendingPoller::activate(gateway.clone(), news.clone(), TrendingOptions::default());
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(gateway.hashtag_calls.load(Ordering::SeqCst), 1);

        handle.deactivate();
        time::sleep(Duration::from_secs(3_000)).await;

        assert_eq!(gateway.hashtag_calls.load(Ordering::SeqCst), 1);
        assert_eq!(news.calls.load(Ordering::SeqCst), 1);
    }
}
