//! One signed-in client: the session, its feeds, likes and trending panels
//! wired onto a backend.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{Mutex, broadcast},
    time,
};

use crate::{
    auth::{self, AuthProvider, SignUpForm},
    engagement::{EngagementView, Notice, Reconciler, ToggleError},
    error::{EchoError, EchoResult},
    feed::FeedAssembler,
    gateway::{self, Gateway},
    media::{self, MediaRejection, MediaStore, MediaUpload},
    model::{FeedEntry, FeedScope, Hashtag, Identity, NewsItem, Post, PostId, Profile, ProfileUpdate, Session, UserId},
    news::NewsFeed,
    session::SessionStore,
    sync::{Redirect, SessionSynchronizer, SyncGuard},
    trending::{TrendingHandle, TrendingOptions, TrendingPoller},
};

/// Upper bound on waiting for the synchronizer after an auth call.
const SYNC_WAIT: Duration = Duration::from_secs(5);

/// The services a client talks to.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub gateway: Arc<dyn Gateway>,
    pub media: Arc<dyn MediaStore>,
    pub news: Arc<dyn NewsFeed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingSnapshot {
    pub hashtags: Vec<Hashtag>,
    pub news: Vec<NewsItem>,
}

pub struct EchoClient {
    session: SessionStore,
    auth: Arc<dyn AuthProvider>,
    gateway: Arc<dyn Gateway>,
    media: Arc<dyn MediaStore>,
    home: FeedAssembler,
    profile_feed: FeedAssembler,
    reconciler: Reconciler,
    trending: TrendingHandle,
    sync: Mutex<SyncGuard>,
}

impl EchoClient {
    /// Restores the session, starts following auth changes and starts the
    /// trending poller.
    pub async fn start(backend: Backend, trending: TrendingOptions) -> Self {
        let session = SessionStore::new();
        let sync = SessionSynchronizer::start(backend.auth.clone(), session.clone()).await;
        let trending = TrendingPoller::activate(backend.gateway.clone(), backend.news, trending);

        Self {
            home: FeedAssembler::new(backend.gateway.clone()),
            profile_feed: FeedAssembler::new(backend.gateway.clone()),
            reconciler: Reconciler::new(backend.gateway.clone(), session.clone()),
            session,
            auth: backend.auth,
            gateway: backend.gateway,
            media: backend.media,
            trending,
            sync: Mutex::new(sync),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session.identity()
    }

    pub fn require_identity(&self) -> EchoResult<Identity> {
        self.identity().ok_or(EchoError::Unauthenticated)
    }

    /// Waits for the next navigation the auth state asks for. Per-user view
    /// state is dropped before a sign-in redirect is handed out. A redirect
    /// left over from before the latest sign-in is skipped.
    pub async fn next_redirect(&self) -> Option<Redirect> {
        let mut sync = self.sync.lock().await;
        loop {
            let redirect = sync.redirects().recv().await;
            if redirect == Some(Redirect::SignIn) && self.identity().is_some() {
                tracing::debug!("skipping sign-in redirect, a user signed in since");
                continue;
            }
            if redirect == Some(Redirect::SignIn) {
                self.detach_views();
            }
            return redirect;
        }
    }

    fn detach_views(&self) {
        self.home.detach();
        self.profile_feed.detach();
        self.reconciler.detach();
    }

    /// Waits until the synchronizer has applied the transition to `expected`.
    async fn await_identity(&self, expected: Option<UserId>) {
        let mut identity = self.session.subscribe();
        let applied = time::timeout(
            SYNC_WAIT,
            identity.wait_for(|current| current.as_ref().map(|me| me.id) == expected),
        )
        .await
        .is_ok_and(|changed| changed.is_ok());

        if !applied {
            tracing::warn!(?expected, "session store did not follow the auth provider in time");
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> EchoResult<Session> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        self.await_identity(Some(session.user.id)).await;
        Ok(session)
    }

    pub async fn sign_up(&self, form: SignUpForm) -> EchoResult<Profile> {
        let profile = auth::sign_up(&*self.auth, &*self.gateway, form).await?;
        match self.auth.get_session().await {
            Ok(Some(session)) => self.await_identity(Some(session.user.id)).await,
            Ok(None) => tracing::info!(user_id = %profile.id, "signed up without a session"),
            Err(err) => tracing::warn!("session after sign up unavailable: {err}"),
        }
        Ok(profile)
    }

    pub async fn sign_out(&self) -> EchoResult<()> {
        self.auth.sign_out().await?;
        self.await_identity(None).await;
        self.detach_views();
        Ok(())
    }

    /// Refreshes the global feed and returns it as the current user sees it.
    pub async fn refresh_home(&self) -> EchoResult<Vec<FeedEntry>> {
        let viewer = self.identity();
        let entries = self.home.refresh(FeedScope::Global, viewer.as_ref()).await?;
        self.reconciler.seed(viewer.as_ref(), &entries);
        Ok(self.reconciler.overlay(&entries))
    }

    pub async fn refresh_profile_feed(&self, author_id: UserId) -> EchoResult<Vec<FeedEntry>> {
        let viewer = self.identity();
        let entries = self
            .profile_feed
            .refresh(FeedScope::ByAuthor(author_id), viewer.as_ref())
            .await?;
        self.reconciler.seed(viewer.as_ref(), &entries);
        Ok(self.reconciler.overlay(&entries))
    }

    /// The home feed as last fetched, with pending likes applied.
    pub fn home_feed(&self) -> Vec<FeedEntry> {
        self.reconciler.overlay(&self.home.current())
    }

    /// Validates and stores an echo by the current user, then refreshes the
    /// home feed. A failed refresh does not fail the post.
    pub async fn post_echo(&self, content: &str, media_url: Option<&str>) -> EchoResult<Post> {
        let author = self.require_identity()?;
        let post = gateway::post_echo(&*self.gateway, author.id, content, media_url).await?;
        tracing::info!(post_id = %post.id, author_id = %author.id, "echo posted");

        if let Err(err) = self.refresh_home().await {
            tracing::warn!("feed refresh after posting failed: {err}");
        }
        Ok(post)
    }

    pub async fn like(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        self.reconciler.like(post_id).await
    }

    pub async fn unlike(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        self.reconciler.unlike(post_id).await
    }

    pub async fn toggle_like(&self, post_id: PostId) -> Result<EngagementView, ToggleError> {
        self.reconciler.toggle(post_id).await
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.reconciler.notices()
    }

    pub async fn profile(&self, id: UserId) -> EchoResult<Option<Profile>> {
        self.gateway.get_profile(id).await
    }

    pub async fn own_profile(&self) -> EchoResult<Option<Profile>> {
        let me = self.require_identity()?;
        self.gateway.get_profile(me.id).await
    }

    /// Creates the current user's profile, e.g. after a sign-up whose profile
    /// step never completed.
    pub async fn create_profile(&self, username: &str, full_name: &str) -> EchoResult<Profile> {
        let me = self.require_identity()?;
        if username.trim().is_empty() || full_name.trim().is_empty() {
            return Err(EchoError::validation("username and full name are required"));
        }
        self.gateway
            .create_profile(Profile {
                id: me.id,
                username: username.to_owned(),
                full_name: full_name.to_owned(),
                bio: None,
                avatar_url: None,
            })
            .await
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> EchoResult<Profile> {
        let me = self.require_identity()?;
        if update.full_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(EchoError::validation("full name cannot be empty"));
        }
        self.gateway.update_profile(me.id, update).await
    }

    pub async fn upload_media(&self, owner: UserId, upload: MediaUpload) -> Result<String, MediaRejection> {
        media::upload_image(&*self.media, owner, upload).await
    }

    pub fn trending(&self) -> TrendingSnapshot {
        TrendingSnapshot {
            hashtags: self.trending.hashtags().borrow().clone(),
            news: self.trending.news().borrow().clone(),
        }
    }
}
