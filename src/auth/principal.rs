use crate::models::Identity;
use crate::store::{SharedStore, StoreResult};

/// Looks the authenticated identity up on every request. No caching, so a
/// deleted account stops authenticating on its very next call.
#[derive(Clone)]
pub struct PrincipalResolver {
    store: SharedStore,
}

impl PrincipalResolver {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the identity no longer exists.
    pub async fn resolve(&self, identity_id: i64) -> StoreResult<Option<Identity>> {
        self.store.find_user_by_id(identity_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::NewIdentity;
    use crate::store::{MemoryStore, UserStore};

    #[tokio::test]
    async fn resolves_existing_and_reports_missing() {
        let memory = Arc::new(MemoryStore::new());
        let created = memory
            .create_user(NewIdentity {
                email: "a@x.com".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                phone: None,
                address: None,
                password_hash: "hash".into(),
            })
            .await
            .expect("create user");

        let resolver = PrincipalResolver::new(memory.clone());
        let found = resolver.resolve(created.id).await.expect("resolve");
        assert_eq!(found.map(|identity| identity.email), Some("a@x.com".into()));

        memory.remove_user(created.id);
        assert!(resolver.resolve(created.id).await.expect("resolve").is_none());
    }
}
