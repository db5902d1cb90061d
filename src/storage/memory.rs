//! In-process reference storage backend: a `tokio::sync::Mutex`-guarded
//! ordered map. Adequate for tests and single-node deployment
//! (SPEC_FULL.md §4.7); not meant to survive a process restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Row, Storage, Transaction};
use crate::error::RegistryError;

#[derive(Default)]
pub struct MemoryStorage {
    rows: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Holds the single lock guard for the duration of one transaction, so every
/// read inside `body` sees every prior write in the same transaction and no
/// other task can interleave (the guard is not released until `body`
/// returns). Writes are buffered in `overlay` and only folded into `base` if
/// `body` returns `Ok`, so a failing body leaves the store unchanged.
struct MapTransaction<'a> {
    base: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction for MapTransaction<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(value) => value.clone(),
            None => self.base.get(key).cloned(),
        }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), None);
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<Row> {
        let mut merged = scan(self.base, prefix);
        merged.retain(|(k, _)| !self.overlay.contains_key(k));
        for (k, v) in &self.overlay {
            if k.starts_with(prefix) {
                if let Some(v) = v {
                    merged.push((k.clone(), v.clone()));
                }
            }
        }
        merged.sort_by(|(a, _), (b, _)| a.cmp(b));
        merged
    }
}

fn scan(rows: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<Row> {
    rows.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self.rows.lock().await.get(key).cloned())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), RegistryError> {
        self.rows.lock().await.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), RegistryError> {
        self.rows.lock().await.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Row>, RegistryError> {
        Ok(scan(&self.rows.lock().await, prefix))
    }

    async fn run_in_transaction<'a>(
        &'a self,
        body: Box<dyn FnOnce(&mut dyn Transaction) -> Result<(), RegistryError> + Send + 'a>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.rows.lock().await;
        let mut txn = MapTransaction {
            base: &guard,
            overlay: BTreeMap::new(),
        };
        body(&mut txn)?;
        let MapTransaction { overlay, .. } = txn;
        for (key, value) in overlay {
            match value {
                Some(value) => {
                    guard.insert(key, value);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryStorage::new();
        store.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStorage::new();
        for k in ["a/1", "a/2", "a/3", "b/1"] {
            store.put(k.as_bytes().to_vec(), k.as_bytes().to_vec()).await.unwrap();
        }
        let rows = store.scan_prefix(b"a/").await.unwrap();
        let keys: Vec<String> = rows
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect();
        assert_eq!(keys, vec!["a/1", "a/2", "a/3"]);
    }

    #[tokio::test]
    async fn transaction_failure_leaves_store_unchanged() {
        let store = MemoryStorage::new();
        store.put(b"a".to_vec(), b"1".to_vec()).await.unwrap();

        let result = store
            .run_in_transaction(Box::new(|txn| {
                txn.put(b"a".to_vec(), b"2".to_vec());
                Err(RegistryError::internal("boom"))
            }))
            .await;

        assert!(result.is_err());
        assert_eq!(store.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    }
}
