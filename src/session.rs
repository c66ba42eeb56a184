use tokio::sync::watch;

use crate::model::Identity;

/// The one identity slot of a client process.
///
/// Cloning yields another handle onto the same slot. Writes are visible to
/// every reader as soon as `set_identity` returns.
#[derive(Clone)]
pub struct SessionStore {
    tx: watch::Sender<Option<Identity>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.tx.send_replace(identity);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn writes_are_visible_to_every_handle() {
        let store = SessionStore::new();
        let reader = store.clone();
        assert_eq!(reader.identity(), None);

        let alice = Identity { id: Uuid::now_v7(), email: "alice@example.com".into() };
        store.set_identity(Some(alice.clone()));
        assert_eq!(reader.identity(), Some(alice));

        store.set_identity(None);
        assert_eq!(reader.identity(), None);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        let bob = Identity { id: Uuid::now_v7(), email: "bob@example.com".into() };
        store.set_identity(Some(bob.clone()));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(bob));
    }
}
