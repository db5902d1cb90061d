//! Revision Engine: fork-on-content-change semantics for Spec and
//! Deployment resources (SPEC_FULL.md §4.2). Generic over [`Revisioned`] so
//! the same state machine drives both entity kinds.

use std::sync::Arc;

use chrono::Utc;

use crate::error::RegistryError;
use crate::keys;
use crate::model::{Revisioned, RevisionTag};
use crate::pagination;
use crate::revision::{self, RevisionRef};
use crate::storage::{Storage, Transaction};

const MAX_MINT_ATTEMPTS: usize = 5;

fn decode<T: Revisioned>(bytes: &[u8]) -> Result<T, RegistryError> {
    serde_json::from_slice(bytes)
        .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))
}

fn encode<T: Revisioned>(record: &T) -> Vec<u8> {
    serde_json::to_vec(record).expect("Revisioned records always serialize")
}

/// Mints a revision id guaranteed not to already exist as a snapshot of
/// `base_name`, retrying up to [`MAX_MINT_ATTEMPTS`] times on collision.
fn mint_unique_revision_id(
    txn: &dyn Transaction,
    base_name: &str,
) -> Result<String, RegistryError> {
    for _ in 0..MAX_MINT_ATTEMPTS {
        let candidate = revision::mint_revision_id();
        if txn.get(&keys::revision_key(base_name, &candidate)).is_none() {
            return Ok(candidate);
        }
    }
    Err(RegistryError::internal(
        "failed to mint a unique revision id after retries",
    ))
}

/// Drives create/update/tag/rollback/list/delete for one revisioned entity
/// kind against a shared storage backend.
pub struct RevisionEngine<T: Revisioned> {
    storage: Arc<dyn Storage>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Revisioned> RevisionEngine<T> {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            _marker: std::marker::PhantomData,
        }
    }

    /// Creates a new resource with its first revision. `record` must already
    /// carry its unqualified `name` and derived fields (hash, size_bytes for
    /// a spec); this sets timestamps and mints `revision_id`.
    pub async fn create(&self, mut record: T) -> Result<T, RegistryError> {
        let name = record.name().to_string();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                if txn.get(&keys::resource_key(&name)).is_some() {
                    return Err(RegistryError::already_exists(format!(
                        "resource '{name}' already exists"
                    )));
                }
                let revision_id = mint_unique_revision_id(txn, &name)?;
                let now = Utc::now();
                record.set_revision_id(revision_id);
                record.set_revision_create_time(now);
                record.set_revision_update_time(now);

                let bytes = encode(&record);
                txn.put(keys::resource_key(&name), bytes.clone());
                txn.put(keys::revision_key(&name, record.revision_id()), bytes);
                Ok(())
            }))
            .await?;
        self.get_current(record.name()).await
    }

    async fn get_current(&self, base_name: &str) -> Result<T, RegistryError> {
        let bytes = self
            .storage
            .get(&keys::resource_key(base_name))
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("resource '{base_name}' not found")))?;
        decode(&bytes)
    }

    /// Reads the resource state addressed by `reference`, resolving tags
    /// through the tag index.
    pub async fn get(&self, base_name: &str, reference: &RevisionRef) -> Result<T, RegistryError> {
        match reference {
            RevisionRef::Current => self.get_current(base_name).await,
            RevisionRef::ById(id) => {
                let bytes = self
                    .storage
                    .get(&keys::revision_key(base_name, id))
                    .await?
                    .ok_or_else(|| {
                        RegistryError::not_found(format!("revision '{id}' not found"))
                    })?;
                decode(&bytes)
            }
            RevisionRef::ByTag(tag) => {
                let revision_id = self.resolve_tag(base_name, tag).await?;
                let bytes = self
                    .storage
                    .get(&keys::revision_key(base_name, &revision_id))
                    .await?
                    .ok_or_else(|| {
                        RegistryError::not_found(format!("revision '{revision_id}' not found"))
                    })?;
                decode(&bytes)
            }
        }
    }

    async fn resolve_tag(&self, base_name: &str, tag: &str) -> Result<String, RegistryError> {
        let bytes = self
            .storage
            .get(&keys::tag_key(base_name, tag))
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("tag '{tag}' not found")))?;
        let stored: RevisionTag = serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::internal(format!("corrupt tag row: {e}")))?;
        Ok(stored.revision_id)
    }

    /// Applies `merge` to the current state and either forks a new revision
    /// (if `merge` changes any revisioned field) or touches the current one
    /// in place.
    pub async fn update(
        &self,
        base_name: &str,
        merge: impl FnOnce(&mut T) + Send + 'static,
    ) -> Result<T, RegistryError> {
        let base_name = base_name.to_string();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                let current_bytes = txn
                    .get(&keys::resource_key(&base_name))
                    .ok_or_else(|| {
                        RegistryError::not_found(format!("resource '{base_name}' not found"))
                    })?;
                let current: T = decode(&current_bytes)?;
                let mut updated = current.clone();
                merge(&mut updated);

                let now = Utc::now();
                if updated.revisioned_fields_differ(&current) {
                    let new_id = mint_unique_revision_id(txn, &base_name)?;
                    updated.set_revision_id(new_id);
                    updated.set_revision_create_time(now);
                    updated.set_revision_update_time(now);
                    let bytes = encode(&updated);
                    txn.put(keys::resource_key(&base_name), bytes.clone());
                    txn.put(keys::revision_key(&base_name, updated.revision_id()), bytes);
                } else {
                    // Unrevisioned fields (e.g. description) may still have
                    // changed; those live only in the resource row. The
                    // revision snapshot itself is immutable apart from its
                    // update time, so it's touched in place rather than
                    // replaced with `updated`.
                    updated.set_revision_update_time(now);
                    let resource_bytes = encode(&updated);
                    txn.put(keys::resource_key(&base_name), resource_bytes);

                    let snapshot_key = keys::revision_key(&base_name, updated.revision_id());
                    let snapshot_bytes = txn.get(&snapshot_key).ok_or_else(|| {
                        RegistryError::internal(format!(
                            "missing revision snapshot for '{base_name}'"
                        ))
                    })?;
                    let mut snapshot: T = decode(&snapshot_bytes)?;
                    snapshot.set_revision_update_time(now);
                    txn.put(snapshot_key, encode(&snapshot));
                }
                Ok(())
            }))
            .await?;
        self.get_current(&base_name).await
    }

    /// Upserts a tag pointing at the revision resolved from `reference`
    /// (which must not itself be `Current`-via-tag-already — any reference
    /// form is accepted and resolved to a concrete revision id first).
    pub async fn tag_revision(
        &self,
        base_name: &str,
        reference: &RevisionRef,
        tag: &str,
    ) -> Result<T, RegistryError> {
        revision::validate_tag(tag)?;
        if revision::is_revision_id(tag) {
            return Err(RegistryError::invalid_argument(
                "tag must not look like a revision id",
            ));
        }
        let revision_id = match reference {
            RevisionRef::Current => self.get_current(base_name).await?.revision_id().to_string(),
            RevisionRef::ById(id) => id.clone(),
            RevisionRef::ByTag(existing) => self.resolve_tag(base_name, existing).await?,
        };

        let base = base_name.to_string();
        let tag_owned = tag.to_string();
        let rev_id = revision_id.clone();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                if txn.get(&keys::revision_key(&base, &rev_id)).is_none() {
                    return Err(RegistryError::not_found(format!(
                        "revision '{rev_id}' not found"
                    )));
                }
                let now = Utc::now();
                let existing_create_time = txn
                    .get(&keys::tag_key(&base, &tag_owned))
                    .and_then(|b| serde_json::from_slice::<RevisionTag>(&b).ok())
                    .map(|t| t.create_time)
                    .unwrap_or(now);
                let row = RevisionTag {
                    parent: base.clone(),
                    tag: tag_owned.clone(),
                    revision_id: rev_id.clone(),
                    create_time: existing_create_time,
                    update_time: now,
                };
                let bytes = serde_json::to_vec(&row)
                    .expect("RevisionTag always serializes");
                txn.put(keys::tag_key(&base, &tag_owned), bytes);
                Ok(())
            }))
            .await?;

        let mut result = self.get(base_name, &RevisionRef::ById(revision_id)).await?;
        result.set_name(format!("{base_name}@{tag}"));
        Ok(result)
    }

    /// Materializes a fresh revision whose revisioned fields copy
    /// `target_revision_id`'s, and makes it current.
    pub async fn rollback(
        &self,
        base_name: &str,
        target_revision_id: &str,
    ) -> Result<T, RegistryError> {
        let base = base_name.to_string();
        let target_id = target_revision_id.to_string();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                let target_bytes = txn
                    .get(&keys::revision_key(&base, &target_id))
                    .ok_or_else(|| {
                        RegistryError::not_found(format!("revision '{target_id}' not found"))
                    })?;
                let target: T = decode(&target_bytes)?;
                if txn.get(&keys::resource_key(&base)).is_none() {
                    return Err(RegistryError::not_found(format!(
                        "resource '{base}' not found"
                    )));
                }

                // `target.create_time` is the resource's original creation time:
                // forks never change it, only `revision_id`/`revision_*_time`.
                let mut rolled_back = target.clone();
                let new_id = mint_unique_revision_id(txn, &base)?;
                let now = Utc::now();
                rolled_back.set_revision_id(new_id);
                rolled_back.set_revision_create_time(now);
                rolled_back.set_revision_update_time(now);

                let bytes = encode(&rolled_back);
                txn.put(keys::resource_key(&base), bytes.clone());
                txn.put(keys::revision_key(&base, rolled_back.revision_id()), bytes);
                Ok(())
            }))
            .await?;
        let mut result = self.get_current(base_name).await?;
        let new_id = result.revision_id().to_string();
        result.set_name(format!("{base_name}@{new_id}"));
        Ok(result)
    }

    /// Lists revisions of `base_name` newest-first by
    /// `(revision_create_time desc, revision_id asc)`.
    pub async fn list_revisions(
        &self,
        base_name: &str,
        page_size: i32,
        page_token: &str,
    ) -> Result<(Vec<T>, String), RegistryError> {
        let limit = pagination::normalize_page_size(page_size);
        let cursor = pagination::decode(page_token, base_name, "", page_size)?;

        let rows = self
            .storage
            .scan_prefix(&keys::revision_scan_prefix(base_name))
            .await?;
        let mut revisions: Vec<T> = rows
            .into_iter()
            .map(|(_, v)| decode(&v))
            .collect::<Result<_, _>>()?;
        revisions.sort_by(|a, b| {
            b.revision_create_time()
                .cmp(&a.revision_create_time())
                .then_with(|| a.revision_id().cmp(b.revision_id()))
        });

        let start = match &cursor {
            None => 0,
            Some(cursor_id) => revisions
                .iter()
                .position(|r| r.revision_id() == cursor_id)
                .map(|i| i + 1)
                .unwrap_or(revisions.len()),
        };

        let mut page: Vec<T> = revisions
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let next_token = if start + page.len() < revisions.len() {
            let last_id = page.last().map(|r| r.revision_id().to_string()).unwrap_or_default();
            pagination::encode(&last_id, base_name, "", page_size)
        } else {
            String::new()
        };
        for revision in &mut page {
            let id = revision.revision_id().to_string();
            revision.set_name(format!("{base_name}@{id}"));
        }
        Ok((page, next_token))
    }

    /// Deletes one revision (not the only remaining one) and any tags
    /// pointing at it, promoting the next-newest revision to current if the
    /// deleted one was current.
    pub async fn delete_revision(
        &self,
        base_name: &str,
        revision_id: &str,
    ) -> Result<(), RegistryError> {
        let base = base_name.to_string();
        let target_id = revision_id.to_string();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                if txn.get(&keys::revision_key(&base, &target_id)).is_none() {
                    return Err(RegistryError::not_found(format!(
                        "revision '{target_id}' not found"
                    )));
                }
                let siblings = txn.scan_prefix(&keys::revision_scan_prefix(&base));
                if siblings.len() <= 1 {
                    return Err(RegistryError::failed_precondition(
                        "cannot delete the only remaining revision",
                    ));
                }

                txn.delete(&keys::revision_key(&base, &target_id));
                for (key, value) in txn.scan_prefix(&keys::tag_scan_prefix(&base)) {
                    if let Ok(tag) = serde_json::from_slice::<RevisionTag>(&value) {
                        if tag.revision_id == target_id {
                            txn.delete(&key);
                        }
                    }
                }

                let current_bytes = txn.get(&keys::resource_key(&base));
                let current_is_target = current_bytes
                    .as_ref()
                    .and_then(|b| decode::<T>(b).ok())
                    .map(|r| r.revision_id() == target_id)
                    .unwrap_or(false);

                if current_is_target {
                    let mut remaining: Vec<T> = siblings
                        .iter()
                        .filter(|(_, v)| {
                            decode::<T>(v)
                                .map(|r| r.revision_id() != target_id)
                                .unwrap_or(false)
                        })
                        .map(|(_, v)| decode::<T>(v))
                        .collect::<Result<_, _>>()?;
                    remaining.sort_by(|a, b| {
                        b.revision_create_time()
                            .cmp(&a.revision_create_time())
                            .then_with(|| a.revision_id().cmp(b.revision_id()))
                    });
                    if let Some(new_current) = remaining.into_iter().next() {
                        txn.put(keys::resource_key(&base), encode(&new_current));
                    }
                }
                Ok(())
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpecRecord;
    use crate::storage::memory::MemoryStorage;
    use chrono::Utc;

    fn new_spec(name: &str, contents: &[u8]) -> SpecRecord {
        let now = Utc::now();
        SpecRecord {
            name: name.to_string(),
            filename: "openapi.yaml".to_string(),
            description: String::new(),
            mime_type: "application/yaml".to_string(),
            size_bytes: contents.len() as i64,
            hash: String::new(),
            source_uri: String::new(),
            contents: contents.to_vec(),
            create_time: now,
            revision_create_time: now,
            revision_update_time: now,
            revision_id: String::new(),
        }
    }

    fn engine() -> RevisionEngine<SpecRecord> {
        RevisionEngine::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn create_then_update_forks_on_content_change() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let r1 = engine.create(new_spec(name, b"A")).await.unwrap();

        let r2 = engine
            .update(name, |r| r.contents = b"B".to_vec())
            .await
            .unwrap();
        assert_ne!(r1.revision_id, r2.revision_id);
        assert_eq!(r2.contents, b"B");
    }

    #[tokio::test]
    async fn update_with_no_change_touches_without_forking() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let r1 = engine.create(new_spec(name, b"A")).await.unwrap();

        let r2 = engine
            .update(name, |r| r.description = "same content, new description".into())
            .await
            .unwrap();
        assert_eq!(r1.revision_id, r2.revision_id);
        assert!(r2.revision_update_time >= r1.revision_update_time);
        assert_eq!(r2.description, "same content, new description");

        // The revision snapshot itself is immutable apart from its update
        // time: it must not pick up the unrevisioned field change.
        let snapshot = engine.get(name, &RevisionRef::ById(r1.revision_id.clone())).await.unwrap();
        assert_eq!(snapshot.description, "");
    }

    #[tokio::test]
    async fn tag_then_get_by_tag_matches_get_by_id() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let r2 = {
            engine.create(new_spec(name, b"A")).await.unwrap();
            engine.update(name, |r| r.contents = b"B".to_vec()).await.unwrap()
        };

        let tagged = engine
            .tag_revision(name, &RevisionRef::Current, "stable")
            .await
            .unwrap();
        let by_id = engine.get(name, &RevisionRef::ById(r2.revision_id.clone())).await.unwrap();
        assert_eq!(tagged.contents, by_id.contents);
        assert_eq!(tagged.revision_id, by_id.revision_id);
        assert!(tagged.name.ends_with("@stable"));
    }

    #[tokio::test]
    async fn rollback_mints_fresh_revision_with_old_content() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let r1 = engine.create(new_spec(name, b"A")).await.unwrap();
        engine.update(name, |r| r.contents = b"B".to_vec()).await.unwrap();

        let r4 = engine.rollback(name, &r1.revision_id).await.unwrap();
        assert_ne!(r4.revision_id, r1.revision_id);
        assert_eq!(r4.contents, b"A");
    }

    #[tokio::test]
    async fn list_revisions_paginates_newest_first() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        engine.create(new_spec(name, b"A")).await.unwrap();
        engine.update(name, |r| r.contents = b"B".to_vec()).await.unwrap();
        engine.update(name, |r| r.contents = b"C".to_vec()).await.unwrap();

        let (page1, token1) = engine.list_revisions(name, 1, "").await.unwrap();
        assert_eq!(page1[0].contents, b"C");
        assert!(!token1.is_empty());

        let (page2, token2) = engine.list_revisions(name, 1, &token1).await.unwrap();
        assert_eq!(page2[0].contents, b"B");
        assert!(!token2.is_empty());

        let (page3, token3) = engine.list_revisions(name, 1, &token2).await.unwrap();
        assert_eq!(page3[0].contents, b"A");
        assert!(token3.is_empty());
    }

    #[tokio::test]
    async fn delete_revision_rejects_the_last_one() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let r1 = engine.create(new_spec(name, b"A")).await.unwrap();

        let err = engine.delete_revision(name, &r1.revision_id).await.unwrap_err();
        assert!(matches!(err, RegistryError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn delete_revision_removes_its_tags() {
        let engine = engine();
        let name = "projects/p/locations/global/apis/a/versions/v/specs/s";
        engine.create(new_spec(name, b"A")).await.unwrap();
        let r2 = engine.update(name, |r| r.contents = b"B".to_vec()).await.unwrap();
        engine.tag_revision(name, &RevisionRef::ById(r2.revision_id.clone()), "latest").await.unwrap();

        engine.delete_revision(name, &r2.revision_id).await.unwrap();

        let err = engine
            .tag_revision(name, &RevisionRef::ByTag("latest".to_string()), "another")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
