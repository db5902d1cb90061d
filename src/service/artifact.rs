//! Artifact operations: non-revisioned binary metadata leaves attachable to
//! any resource in the tree (SPEC_FULL.md §3.3). Content hash and size are
//! derived the same way as for Specs (I3's sibling rule for Artifacts).

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::RegistryError;
use crate::keys;
use crate::model::ArtifactRecord;
use crate::name::{self, ArtifactKey};

use super::{artifact_collection, RegistryService};

fn sha256_hex(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

impl RegistryService {
    pub async fn create_artifact(
        &self,
        parent: &str,
        artifact_id: &str,
        mime_type: String,
        contents: Vec<u8>,
    ) -> Result<ArtifactRecord, RegistryError> {
        name::validate_id(artifact_id)?;
        // The parent may be any resource kind; `parse` validates its shape
        // without needing to know which kind in advance.
        name::parse(parent)?;
        self.require_parent(parent).await?;

        let key = ArtifactKey {
            parent: parent.to_string(),
            artifact: artifact_id.to_string(),
        };
        let now = Utc::now();
        let hash = sha256_hex(&contents);
        let size_bytes = contents.len() as i64;
        let record = ArtifactRecord {
            name: key.canonical(),
            mime_type,
            size_bytes,
            hash,
            contents,
            create_time: now,
            update_time: now,
        };
        let bytes = serde_json::to_vec(&record).expect("ArtifactRecord always serializes");
        let storage_key = keys::resource_key(&record.name);
        let record_name = record.name.clone();
        self.storage()
            .run_in_transaction(Box::new(move |txn| {
                if txn.get(&storage_key).is_some() {
                    return Err(RegistryError::already_exists(format!(
                        "resource '{record_name}' already exists"
                    )));
                }
                txn.put(storage_key.clone(), bytes.clone());
                Ok(())
            }))
            .await?;
        Ok(record)
    }

    pub async fn get_artifact(&self, name: &str) -> Result<ArtifactRecord, RegistryError> {
        name::parse_artifact(name)?;
        let bytes = self
            .storage()
            .get(&keys::resource_key(name))
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("resource '{name}' not found")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))
    }

    pub async fn list_artifacts(
        &self,
        parent: &str,
        page_size: i32,
        page_token: &str,
        filter_expr: &str,
    ) -> Result<(Vec<ArtifactRecord>, String), RegistryError> {
        name::parse(parent)?;
        let filter = crate::filter::Filter::parse(filter_expr, &["mime_type"])?;
        let cursor = crate::pagination::decode(page_token, parent, filter_expr, page_size)?;
        let limit = crate::pagination::normalize_page_size(page_size);

        let collection = artifact_collection(parent);
        let rows = self
            .storage()
            .scan_prefix(&keys::resource_scan_prefix(&collection))
            .await?;
        let mut records: Vec<ArtifactRecord> = Vec::new();
        for (_, value) in rows {
            let record: ArtifactRecord = serde_json::from_slice(&value)
                .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))?;
            if !super::is_direct_child(&record.name, &collection) {
                continue;
            }
            if filter.matches(|field| match field {
                "mime_type" => Some(record.mime_type.clone()),
                _ => None,
            }) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let start = match &cursor {
            None => 0,
            Some(after) => records
                .iter()
                .position(|r| &r.name == after)
                .map(|i| i + 1)
                .unwrap_or(records.len()),
        };
        let page: Vec<ArtifactRecord> = records.iter().skip(start).take(limit).cloned().collect();
        let next_token = if start + page.len() < records.len() {
            let last = page.last().map(|r| r.name.clone()).unwrap_or_default();
            crate::pagination::encode(&last, parent, filter_expr, page_size)
        } else {
            String::new()
        };
        Ok((page, next_token))
    }

    /// Artifacts have no revision history: replacing contents overwrites the
    /// one row in place (SPEC_FULL.md §4.2, "Artifact is the non-revisioned
    /// case").
    pub async fn update_artifact(
        &self,
        name: &str,
        mime_type: String,
        contents: Option<Vec<u8>>,
        update_mask: &[String],
    ) -> Result<ArtifactRecord, RegistryError> {
        name::parse_artifact(name)?;
        let wants = |field: &str| update_mask.is_empty() || update_mask.iter().any(|m| m == field);
        let mut record = self.get_artifact(name).await?;

        if wants("mime_type") && !mime_type.is_empty() {
            record.mime_type = mime_type;
        }
        if wants("contents") {
            if let Some(contents) = contents {
                if !contents.is_empty() {
                    record.hash = sha256_hex(&contents);
                    record.size_bytes = contents.len() as i64;
                    record.contents = contents;
                }
            }
        }
        record.update_time = Utc::now();

        let bytes = serde_json::to_vec(&record).expect("ArtifactRecord always serializes");
        self.storage().put(keys::resource_key(name), bytes).await?;
        Ok(record)
    }

    pub async fn delete_artifact(&self, name: &str) -> Result<(), RegistryError> {
        name::parse_artifact(name)?;
        self.delete_cascade(name).await
    }
}
