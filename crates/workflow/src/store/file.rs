use super::{sort_newest_first, ContractStore};
use crate::contract::{Contract, ContractRecord, CurrentUser};
use crate::error::{Collaborator, Result, WorkflowError};
use async_trait::async_trait;
use covenant_blocks::Reconciler;
use fs2::FileExt;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "store.lock";
const RECORD_EXT: &str = "json";

/// One JSON record per contract under a directory.
///
/// Writes hold an exclusive `fs2` lock on the directory so that the version
/// check and the replace happen atomically across processes.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    reconciler: Reconciler,
}

struct StoreWriteLock {
    file: std::fs::File,
}

impl Drop for StoreWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, reconciler: Reconciler) -> Self {
        Self {
            dir: dir.into(),
            reconciler,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }

    async fn acquire_write_lock(&self) -> Result<StoreWriteLock> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);

        tokio::task::spawn_blocking(move || -> Result<StoreWriteLock> {
            use std::fs::OpenOptions;

            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|err| {
                    WorkflowError::transport(
                        Collaborator::Store,
                        format!("open store lock {}: {err}", path.display()),
                    )
                })?;
            file.lock_exclusive().map_err(|err| {
                WorkflowError::transport(
                    Collaborator::Store,
                    format!("acquire store lock {}: {err}", path.display()),
                )
            })?;
            Ok(StoreWriteLock { file })
        })
        .await
        .map_err(|err| {
            WorkflowError::transport(Collaborator::Store, format!("join store lock task: {err}"))
        })?
    }

    async fn read_record(path: &Path) -> Result<Option<ContractRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl ContractStore for FileStore {
    async fn load(&self, id: &str) -> Result<Option<Contract>> {
        let path = match self.record_path(id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        match Self::read_record(&path).await? {
            Some(record) => Ok(Some(record.into_contract(&self.reconciler)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, contract: &Contract, expected_version: Option<u64>) -> Result<Contract> {
        let path = self.record_path(&contract.id)?;
        let _lock = self.acquire_write_lock().await?;

        let current = Self::read_record(&path).await?.map(|r| r.version);
        if current != expected_version {
            return Err(WorkflowError::VersionConflict {
                id: contract.id.clone(),
                expected: expected_version,
                actual: current,
            });
        }

        let mut saved = contract.clone();
        saved.version = expected_version.map_or(1, |v| v + 1);
        let bytes = serde_json::to_vec_pretty(&saved.to_record()?)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!(
            "Stored contract {} at version {} in {}",
            saved.id,
            saved.version,
            path.display()
        );
        Ok(saved)
    }

    async fn list_for_user(&self, user: &CurrentUser) -> Result<Vec<Contract>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut list = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let record = match Self::read_record(&path).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("Skipping unreadable record {}: {err}", path.display());
                    continue;
                }
            };
            match record.into_contract(&self.reconciler) {
                Ok(contract) if contract.involves(user) => list.push(contract),
                Ok(_) => {}
                Err(err) => log::warn!("Skipping unreadable record {}: {err}", path.display()),
            }
        }
        sort_newest_first(&mut list);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_contract() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Reconciler::default());
        super::super::tests::exercise_store(&store).await;

        assert!(dir.path().join("c-1.json").exists());
        assert!(!dir.path().join("c-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupted_document_is_binding_mismatch() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Reconciler::default());
        let contract = Contract::draft(
            "c-9",
            "Lease",
            "a lease",
            &super::super::tests::alice(),
            crate::contract::tests::two_party_document(),
        );
        store.save(&contract, None).await.unwrap();

        let path = dir.path().join("c-9.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut record: ContractRecord = serde_json::from_str(&raw).unwrap();
        record.content = record.content.replace(r#","index":1"#, r#","index":3"#);
        std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

        let err = store.load("c-9").await.unwrap_err();
        assert_eq!(err.code(), "binding_mismatch");
    }

    #[tokio::test]
    async fn listing_skips_garbage_records() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Reconciler::default());
        let alice = super::super::tests::alice();
        let contract = Contract::draft(
            "c-2",
            "Lease",
            "a lease",
            &alice,
            crate::contract::tests::two_party_document(),
        );
        store.save(&contract, None).await.unwrap();
        std::fs::write(dir.path().join("junk.json"), b"not json").unwrap();
        std::fs::create_dir(dir.path().join("folder.json")).unwrap();

        let listed = store.list_for_user(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "c-2");
    }

    #[tokio::test]
    async fn path_like_ids_are_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path(), Reconciler::default());
        assert!(store.load("../etc/passwd").await.unwrap().is_none());
    }
}
