//! Session store: at most one authenticated identity plus its credential
//! token, persisted in a [`SessionStorage`] shared by every open view.
//!
//! A `SessionStore` value is one view. Clones belong to the same view;
//! [`SessionStore::new_view`] opens another view on the same storage.
//! Mutations notify subscribers of this view directly and subscribers of
//! other views through the storage's change events.
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use crate::models::Identity;
use crate::roles::Role;
use crate::storage::{SessionStorage, StorageEvent, IDENTITY_KEY, TOKEN_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub identity: Option<Identity>,
    /// Only ever present alongside an identity.
    pub token: Option<String>,
}

impl Session {
    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|identity| identity.role)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// Written by this view.
    Local,
    /// Written by another view or another process.
    External,
}

#[derive(Clone)]
pub struct SessionStore {
    view_id: Uuid,
    storage: Arc<dyn SessionStorage>,
    local: broadcast::Sender<SessionChange>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (local, _) = broadcast::channel(16);
        Self {
            view_id: Uuid::new_v4(),
            storage,
            local,
        }
    }

    pub fn new_view(&self) -> Self {
        Self::new(Arc::clone(&self.storage))
    }

    /// Current session as persisted. Unreadable state is the absent session.
    pub fn get(&self) -> Session {
        // One read, so the token always belongs to the identity beside it.
        let mut entries = self.storage.get_items(&[IDENTITY_KEY, TOKEN_KEY]).into_iter();
        let raw = entries.next().flatten();
        let token = entries.next().flatten();
        let Some(raw) = raw else {
            return Session::default();
        };
        match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) => Session {
                identity: Some(identity),
                token,
            },
            Err(err) => {
                tracing::warn!(error = %err, "persisted identity unreadable, treating as signed out");
                Session::default()
            }
        }
    }

    /// Persists `identity` and `token` together. A missing token erases any
    /// token left by a previous session.
    pub fn set(&self, identity: &Identity, token: Option<&str>) {
        let raw = match serde_json::to_string(identity) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize identity");
                return;
            }
        };
        self.write(&[(IDENTITY_KEY, Some(raw.as_str())), (TOKEN_KEY, token)]);
    }

    pub fn clear(&self) {
        self.write(&[(IDENTITY_KEY, None), (TOKEN_KEY, None)]);
    }

    fn write(&self, changes: &[(&str, Option<&str>)]) {
        match self.storage.apply(changes, self.view_id) {
            Ok(true) => {
                let _ = self.local.send(SessionChange::Local);
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to persist session");
            }
        }
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            view_id: self.view_id,
            local: self.local.subscribe(),
            storage: self.storage.subscribe(),
        }
    }
}

pub struct SessionSubscription {
    view_id: Uuid,
    local: broadcast::Receiver<SessionChange>,
    storage: broadcast::Receiver<StorageEvent>,
}

impl SessionSubscription {
    /// Waits for the next session change. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        let view_id = self.view_id;
        loop {
            tokio::select! {
                local = self.local.recv() => match local {
                    Ok(change) => return Some(change),
                    // Missed signals still mean the session must be re-read.
                    Err(RecvError::Lagged(_)) => return Some(SessionChange::Local),
                    Err(RecvError::Closed) => return None,
                },
                event = self.storage.recv() => match event {
                    Ok(event) => {
                        if let Some(change) = external_change(view_id, &event) {
                            return Some(change);
                        }
                    }
                    Err(RecvError::Lagged(_)) => return Some(SessionChange::External),
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SessionChange> {
        match self.local.try_recv() {
            Ok(change) => return Some(change),
            Err(TryRecvError::Lagged(_)) => return Some(SessionChange::Local),
            Err(TryRecvError::Empty | TryRecvError::Closed) => {}
        }
        loop {
            match self.storage.try_recv() {
                Ok(event) => {
                    if let Some(change) = external_change(self.view_id, &event) {
                        return Some(change);
                    }
                }
                Err(TryRecvError::Lagged(_)) => return Some(SessionChange::External),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

// Only identity changes written by someone else count.
fn external_change(view_id: Uuid, event: &StorageEvent) -> Option<SessionChange> {
    if event.key != IDENTITY_KEY || event.origin == Some(view_id) {
        return None;
    }
    Some(SessionChange::External)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use crate::storage::{Change, MemoryStorage};

    fn identity(role: Role) -> Identity {
        Identity {
            id: Some(UserId::new("12")),
            email: "a@b.com".to_string(),
            role,
        }
    }

    fn store() -> (MemoryStorage, SessionStore) {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(Arc::new(storage.clone()));
        (storage, store)
    }

    #[test]
    fn empty_storage_is_absent_session() {
        let (_, store) = store();
        assert_eq!(store.get(), Session::default());
        assert!(!store.get().is_authenticated());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let (_, store) = store();
        let alice = identity(Role::Student);
        store.set(&alice, Some("jwt"));

        let session = store.get();
        assert_eq!(session.identity, Some(alice));
        assert_eq!(session.token.as_deref(), Some("jwt"));
        assert_eq!(session.role(), Some(Role::Student));
    }

    #[test]
    fn clear_then_get_is_absent_and_idempotent() {
        let (_, store) = store();
        store.set(&identity(Role::Administrator), Some("jwt"));
        store.clear();
        let once = store.get();
        store.clear();
        assert_eq!(store.get(), once);
        assert_eq!(once, Session::default());
    }

    #[test]
    fn set_without_token_drops_previous_token() {
        let (_, store) = store();
        store.set(&identity(Role::Student), Some("old"));
        store.set(&identity(Role::Instructor), None);
        assert_eq!(store.get().token, None);
    }

    #[test]
    fn corrupt_identity_is_absent_session() {
        let (storage, store) = store();
        storage
            .apply(
                &[(IDENTITY_KEY, Some("{broken")), (TOKEN_KEY, Some("jwt"))],
                Uuid::new_v4(),
            )
            .unwrap();
        assert_eq!(store.get(), Session::default());
    }

    #[test]
    fn token_without_identity_is_ignored() {
        let (storage, store) = store();
        storage
            .apply(&[(TOKEN_KEY, Some("jwt"))], Uuid::new_v4())
            .unwrap();
        assert_eq!(store.get().token, None);
    }

    #[test]
    fn own_view_sees_local_change_once() {
        let (_, store) = store();
        let mut sub = store.subscribe();
        store.set(&identity(Role::Student), Some("jwt"));

        assert_eq!(sub.try_recv(), Some(SessionChange::Local));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn other_view_sees_external_change() {
        let (_, store) = store();
        let other = store.new_view();
        let mut sub = other.subscribe();

        store.set(&identity(Role::Student), Some("jwt"));
        assert_eq!(sub.try_recv(), Some(SessionChange::External));
        assert_eq!(other.get().role(), Some(Role::Student));

        store.clear();
        assert_eq!(sub.try_recv(), Some(SessionChange::External));
        assert!(!other.get().is_authenticated());
    }

    #[test]
    fn redundant_clear_does_not_notify() {
        let (_, store) = store();
        let mut sub = store.subscribe();
        store.clear();
        assert_eq!(sub.try_recv(), None);
    }

    // Lets another writer sign in between two reads of the same `get`.
    struct RacingStorage {
        inner: MemoryStorage,
        next_login: parking_lot::Mutex<Option<(String, String)>>,
    }

    impl SessionStorage for RacingStorage {
        fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
            let items = self.inner.get_items(keys);
            if let Some((identity, token)) = self.next_login.lock().take() {
                self.inner
                    .apply(
                        &[
                            (IDENTITY_KEY, Some(identity.as_str())),
                            (TOKEN_KEY, Some(token.as_str())),
                        ],
                        Uuid::new_v4(),
                    )
                    .unwrap();
            }
            items
        }

        fn apply(&self, changes: &[Change<'_>], origin: Uuid) -> anyhow::Result<bool> {
            self.inner.apply(changes, origin)
        }

        fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn get_pairs_identity_with_its_own_token() {
        let other = Identity {
            id: Some(UserId::new("99")),
            email: "other@b.com".to_string(),
            role: Role::Administrator,
        };
        let storage = Arc::new(RacingStorage {
            inner: MemoryStorage::new(),
            next_login: parking_lot::Mutex::new(None),
        });
        let store = SessionStore::new(storage.clone());
        store.set(&identity(Role::Student), Some("student-token"));
        *storage.next_login.lock() = Some((
            serde_json::to_string(&other).unwrap(),
            "admin-token".to_string(),
        ));

        let session = store.get();
        assert_eq!(session.role(), Some(Role::Student));
        assert_eq!(session.token.as_deref(), Some("student-token"));
        assert_eq!(store.get().token.as_deref(), Some("admin-token"));
    }

    #[tokio::test]
    async fn recv_wakes_on_external_logout() {
        let (_, store) = store();
        store.set(&identity(Role::Student), Some("jwt"));
        let other = store.new_view();
        let mut sub = other.subscribe();

        store.clear();
        assert_eq!(sub.recv().await, Some(SessionChange::External));
    }
}
