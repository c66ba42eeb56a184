use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    auth::{AuthEvent, AuthProvider},
    error::{Operation, absorb},
    session::SessionStore,
};

/// Where presentation should navigate after an auth transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// The unauthenticated entry point.
    SignIn,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How often a signed-in session is handed back to the provider so it can
    /// renew a token that is about to expire.
    pub refresh_every: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { refresh_every: Duration::from_secs(30) }
    }
}

/// Keeps a [`SessionStore`] in step with an [`AuthProvider`] for as long as
/// the protected view that owns it is mounted. It is the only writer of the
/// store.
pub struct SessionSynchronizer;

impl SessionSynchronizer {
    pub async fn start(auth: Arc<dyn AuthProvider>, store: SessionStore) -> SyncGuard {
        Self::start_with(auth, store, SyncOptions::default()).await
    }

    pub async fn start_with(auth: Arc<dyn AuthProvider>, store: SessionStore, options: SyncOptions) -> SyncGuard {
        // subscribe before fetching so nothing slips between the two
        let mut subscription = auth.subscribe();

        let initial = match absorb(Operation::InitialSession, auth.get_session().await) {
            Ok(session) => session.flatten(),
            Err(err) => {
                tracing::error!("could not restore session: {err}");
                None
            }
        };
        tracing::debug!(signed_in = initial.is_some(), "initial session");
        store.set_identity(initial.map(|session| session.user));

        let (redirect_tx, redirects) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + options.refresh_every, options.refresh_every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    change = subscription.next() => {
                        let Some((event, session)) = change else {
                            break;
                        };
                        let identity = session.map(|session| session.user);
                        let signed_out = identity.is_none();
                        store.set_identity(identity);

                        if signed_out {
                            tracing::info!(?event, "signed out, redirecting to sign in");
                            let _ = redirect_tx.send(Redirect::SignIn);
                        } else if event == AuthEvent::SignedIn {
                            tracing::info!("signed in");
                        }
                    }
                    _ = ticks.tick() => {
                        if store.identity().is_none() {
                            continue;
                        }
                        // renewals and rejections arrive as auth events
                        if let Err(err) = absorb(Operation::RefreshSession, auth.get_session().await) {
                            tracing::error!("session refresh failed: {err}");
                        }
                    }
                }
            }
            tracing::debug!("auth provider closed its event stream");
        });

        SyncGuard { task, redirects }
    }
}

/// Stops synchronizing when dropped.
pub struct SyncGuard {
    task: JoinHandle<()>,
    redirects: mpsc::UnboundedReceiver<Redirect>,
}

impl SyncGuard {
    pub fn redirects(&mut self) -> &mut mpsc::UnboundedReceiver<Redirect> {
        &mut self.redirects
    }

    pub fn stop(self) {}
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
