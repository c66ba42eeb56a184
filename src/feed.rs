use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::{
    error::{EchoResult, Operation, absorb},
    gateway::Gateway,
    model::{FeedEntry, FeedScope, Identity},
};

/// Keeps the displayed sequence of one feed view.
///
/// Each refresh replaces the whole sequence. A refresh that completes after a
/// newer one was started, or after [`FeedAssembler::detach`], is discarded.
pub struct FeedAssembler {
    gateway: Arc<dyn Gateway>,
    // bumped by every refresh and by detach
    generation: Mutex<u64>,
    tx: watch::Sender<Arc<[FeedEntry]>>,
}

impl FeedAssembler {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            generation: Mutex::new(0),
            tx: watch::Sender::new(Arc::from(Vec::new())),
        }
    }

    pub fn current(&self) -> Arc<[FeedEntry]> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<[FeedEntry]>> {
        self.tx.subscribe()
    }

    /// Fetches `scope` in full and, unless superseded meanwhile, displays it.
    ///
    /// On failure the previous sequence stays displayed and the error is
    /// returned for presentation to report.
    pub async fn refresh(
        &self,
        scope: FeedScope,
        viewer: Option<&Identity>,
    ) -> EchoResult<Arc<[FeedEntry]>> {
        let generation = {
            let mut latest = self.lock();
            *latest += 1;
            *latest
        };

        let result = self.gateway.list_feed(scope).await;

        let latest = self.lock();
        if generation != *latest {
            tracing::debug!(?scope, generation, "discarding superseded feed response");
            return Ok(self.current());
        }

        match absorb(Operation::ListFeed, result) {
            Ok(None) => Ok(self.current()),
            Ok(Some(records)) => {
                let entries: Arc<[FeedEntry]> = records
                    .into_iter()
                    .map(|record| FeedEntry::from_record(record, viewer))
                    .collect::<Vec<_>>()
                    .into();

                self.tx.send_replace(entries.clone());
                tracing::debug!(?scope, count = entries.len(), "feed refreshed");
                Ok(entries)
            }
            Err(err) => {
                tracing::warn!(?scope, "feed refresh failed, keeping previous entries: {err}");
                Err(err)
            }
        }
    }

    /// The view went away: responses still in flight must not be applied.
    pub fn detach(&self) {
        *self.lock() += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
