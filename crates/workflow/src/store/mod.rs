//! Contract persistence.
//!
//! Every save is a compare-and-swap on [`Contract::version`]: `None` inserts a
//! new contract, `Some(v)` replaces the stored contract only while it is still
//! at version `v`. The stored version is bumped by one on every write.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::contract::{Contract, CurrentUser};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Contract>>;

    /// Persist `contract`, returning it with its new version
    async fn save(&self, contract: &Contract, expected_version: Option<u64>) -> Result<Contract>;

    /// Contracts created by `user` or naming their email, newest first
    async fn list_for_user(&self, user: &CurrentUser) -> Result<Vec<Contract>>;
}

pub(crate) fn sort_newest_first(contracts: &mut [Contract]) {
    contracts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::contract::tests::two_party_document;
    use crate::contract::ContractParty;
    use crate::error::WorkflowError;
    use covenant_blocks::PartyId;

    pub(crate) fn alice() -> CurrentUser {
        CurrentUser::new("u-alice", "alice@example.com", "Alice")
    }

    /// Behaviour every adapter must share
    pub(crate) async fn exercise_store(store: &dyn ContractStore) {
        let draft = Contract::draft("c-1", "Lease", "a lease", &alice(), two_party_document());
        assert!(store.load("c-1").await.unwrap().is_none());

        let saved = store.save(&draft, None).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = store.save(&draft, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::VersionConflict { .. }));

        let mut next = saved.clone();
        next.upsert_party(ContractParty::new("Bob", "bob@example.com", PartyId::Counterparty));
        let next = store.save(&next, Some(saved.version)).await.unwrap();
        assert_eq!(next.version, 2);

        let err = store.save(&saved, Some(saved.version)).await.unwrap_err();
        assert!(err.is_retryable());

        let loaded = store.load("c-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.document, next.document);
        assert_eq!(loaded.parties.len(), 2);

        let mut older = Contract::draft("c-0", "NDA", "an nda", &alice(), two_party_document());
        older.created_at -= chrono::Duration::days(1);
        store.save(&older, None).await.unwrap();

        let bob = CurrentUser::new("u-bob", "bob@example.com", "Bob");
        let eve = CurrentUser::new("u-eve", "eve@example.com", "Eve");
        let ids = |list: Vec<Contract>| list.into_iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(store.list_for_user(&alice()).await.unwrap()), vec!["c-1", "c-0"]);
        assert_eq!(ids(store.list_for_user(&bob).await.unwrap()), vec!["c-1"]);
        assert!(store.list_for_user(&eve).await.unwrap().is_empty());
    }
}
