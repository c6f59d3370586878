use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scan::pipeline::ScanResult;

/// Transient scan state for one authenticated user.
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    pub uploaded_filename: Option<String>,
    pub latest_scan_results: Option<ScanResult>,
}

/// In-process session store keyed by the authenticated user's ID, so a
/// result can only ever be read back by the user that produced it.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, ScanSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_uploaded(&self, user_id: Uuid, filename: String) {
        self.inner
            .write()
            .await
            .entry(user_id)
            .or_default()
            .uploaded_filename = Some(filename);
    }

    pub async fn uploaded(&self, user_id: Uuid) -> Option<String> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .and_then(|s| s.uploaded_filename.clone())
    }

    pub async fn take_uploaded(&self, user_id: Uuid) -> Option<String> {
        self.take(user_id, |s| s.uploaded_filename.take()).await
    }

    pub async fn set_results(&self, user_id: Uuid, results: ScanResult) {
        self.inner
            .write()
            .await
            .entry(user_id)
            .or_default()
            .latest_scan_results = Some(results);
    }

    pub async fn has_results(&self, user_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .get(&user_id)
            .is_some_and(|s| s.latest_scan_results.is_some())
    }

    pub async fn take_results(&self, user_id: Uuid) -> Option<ScanResult> {
        self.take(user_id, |s| s.latest_scan_results.take()).await
    }

    /// Takes one field; a session left with nothing in it is dropped.
    async fn take<T>(
        &self,
        user_id: Uuid,
        field: impl FnOnce(&mut ScanSession) -> Option<T>,
    ) -> Option<T> {
        let mut sessions = self.inner.write().await;
        let session = sessions.get_mut(&user_id)?;
        let taken = field(session);
        if session.uploaded_filename.is_none() && session.latest_scan_results.is_none() {
            sessions.remove(&user_id);
        }
        taken
    }

    #[cfg(test)]
    pub async fn active_users(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Removes the whole session, returning what it held.
    pub async fn clear(&self, user_id: Uuid) -> ScanSession {
        self.inner
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{lookup::ProductRecord, nutrients::NUTRIENT_MAP};
    use crate::scan::pipeline::Analysis;

    fn result() -> ScanResult {
        ScanResult {
            product: ProductRecord::default(),
            analysis: Analysis {
                advisability: "Yes".into(),
                summary: "Fine.".into(),
            },
            nutrient_map: NUTRIENT_MAP,
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_user() {
        let store = SessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.set_uploaded(alice, "a.jpg".into()).await;
        store.set_results(alice, result()).await;

        assert_eq!(store.uploaded(bob).await, None);
        assert!(!store.has_results(bob).await);
        assert!(store.take_results(bob).await.is_none());
        assert!(store.has_results(alice).await);
    }

    #[tokio::test]
    async fn take_clears_the_value() {
        let store = SessionStore::new();
        let user = Uuid::new_v4();
        store.set_uploaded(user, "a.jpg".into()).await;
        store.set_results(user, result()).await;

        assert_eq!(store.take_uploaded(user).await.as_deref(), Some("a.jpg"));
        assert_eq!(store.take_uploaded(user).await, None);
        assert!(store.take_results(user).await.is_some());
        assert!(store.take_results(user).await.is_none());
    }

    #[tokio::test]
    async fn emptied_sessions_are_dropped() {
        let store = SessionStore::new();
        let user = Uuid::new_v4();
        store.set_uploaded(user, "a.jpg".into()).await;
        store.set_results(user, result()).await;

        store.take_results(user).await;
        assert_eq!(store.active_users().await, 1);
        store.take_uploaded(user).await;
        assert_eq!(store.active_users().await, 0);

        assert_eq!(store.take_uploaded(user).await, None);
        assert_eq!(store.active_users().await, 0);
    }

    #[tokio::test]
    async fn clear_returns_previous_state() {
        let store = SessionStore::new();
        let user = Uuid::new_v4();
        store.set_uploaded(user, "b.jpg".into()).await;
        let old = store.clear(user).await;
        assert_eq!(old.uploaded_filename.as_deref(), Some("b.jpg"));
        assert_eq!(store.uploaded(user).await, None);
    }
}
