use super::{sort_newest_first, ContractStore};
use crate::contract::{Contract, CurrentUser};
use crate::error::{Result, WorkflowError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store, used for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    contracts: RwLock<HashMap<String, Contract>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<Contract>> {
        Ok(self.contracts.read().await.get(id).cloned())
    }

    async fn save(&self, contract: &Contract, expected_version: Option<u64>) -> Result<Contract> {
        let mut contracts = self.contracts.write().await;
        let current = contracts.get(&contract.id).map(|c| c.version);
        if current != expected_version {
            return Err(WorkflowError::VersionConflict {
                id: contract.id.clone(),
                expected: expected_version,
                actual: current,
            });
        }

        let mut saved = contract.clone();
        saved.version = expected_version.map_or(1, |v| v + 1);
        contracts.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    async fn list_for_user(&self, user: &CurrentUser) -> Result<Vec<Contract>> {
        let mut list: Vec<Contract> = self
            .contracts
            .read()
            .await
            .values()
            .filter(|c| c.involves(user))
            .cloned()
            .collect();
        sort_newest_first(&mut list);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_contract() {
        super::super::tests::exercise_store(&MemoryStore::new()).await;
    }
}
