//! Storage Abstraction: a narrow, backend-agnostic contract for a
//! transactional, ordered key/range store (SPEC_FULL.md §4.7).
//!
//! This is the seam at which a real clustered KV service would be
//! substituted; this system ships only the in-process reference backend in
//! [`memory`].

pub mod memory;

use async_trait::async_trait;

use crate::error::RegistryError;

/// A single row: a raw key and its serialized value.
pub type Row = (Vec<u8>, Vec<u8>);

/// A transactional, ordered key/value contract. Keys order lexicographically
/// by their raw bytes, so `scan_prefix` over a resource's canonical name
/// enumerates exactly its descendants.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RegistryError>;

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), RegistryError>;

    async fn delete(&self, key: &[u8]) -> Result<(), RegistryError>;

    /// Ordered scan of every row whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Row>, RegistryError>;

    /// Runs `body` against a consistent view of the store; either every
    /// write `body` makes is visible afterward, or none are (SPEC_FULL.md
    /// §5, Atomicity). Implementations may retry `body` internally; `body`
    /// must therefore be idempotent with respect to its own side effects
    /// beyond the transaction handle.
    async fn run_in_transaction<'a>(
        &'a self,
        body: Box<dyn FnOnce(&mut dyn Transaction) -> Result<(), RegistryError> + Send + 'a>,
    ) -> Result<(), RegistryError>;
}

/// The view of the store available inside `run_in_transaction`. Mirrors
/// `Storage`'s read/write surface but is synchronous: the in-memory backend
/// holds its guard for the transaction's whole lifetime, so there is no
/// `.await` point where another writer could interleave.
pub trait Transaction {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&mut self, key: &[u8]);
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<Row>;
}
