//! Spec resource operations: thin wrappers over the generic revision engine
//! that add name validation and content-hash derivation (I3).

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::RegistryError;
use crate::model::SpecRecord;
use crate::name::{self, SpecKey};
use crate::revision::{self, RevisionRef};

use super::{spec_collection, RegistryService};

fn sha256_hex(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

impl RegistryService {
    pub async fn create_api_spec(
        &self,
        parent: &str,
        api_spec_id: &str,
        filename: String,
        description: String,
        mime_type: String,
        source_uri: String,
        contents: Vec<u8>,
    ) -> Result<SpecRecord, RegistryError> {
        let parent_key = name::parse_version(parent)?;
        name::validate_id(api_spec_id)?;
        self.require_parent(parent).await?;

        let key = SpecKey {
            project: parent_key.project,
            api: parent_key.api,
            version: parent_key.version,
            spec: api_spec_id.to_string(),
        };
        let now = Utc::now();
        let hash = sha256_hex(&contents);
        let size_bytes = contents.len() as i64;
        let record = SpecRecord {
            name: key.canonical(),
            filename,
            description,
            mime_type,
            size_bytes,
            hash,
            source_uri,
            contents,
            create_time: now,
            revision_create_time: now,
            revision_update_time: now,
            revision_id: String::new(),
        };
        self.spec_engine.create(record).await
    }

    pub async fn get_api_spec(&self, name: &str) -> Result<SpecRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_spec(base)?;
        let mut record = self.spec_engine.get(base, &reference).await?;
        record.name = rewrite_response_name(base, &reference, &record.revision_id);
        Ok(record)
    }

    pub async fn list_api_specs(
        &self,
        parent: &str,
        page_size: i32,
        page_token: &str,
        filter_expr: &str,
    ) -> Result<(Vec<SpecRecord>, String), RegistryError> {
        name::parse_version(parent)?;
        let filter = crate::filter::Filter::parse(
            filter_expr,
            &["filename", "description", "mime_type", "source_uri"],
        )?;
        let cursor = crate::pagination::decode(page_token, parent, filter_expr, page_size)?;
        let limit = crate::pagination::normalize_page_size(page_size);

        let collection = spec_collection(parent);
        let rows = self
            .storage()
            .scan_prefix(&crate::keys::resource_scan_prefix(&collection))
            .await?;
        let mut records: Vec<SpecRecord> = Vec::new();
        for (_, value) in rows {
            let record: SpecRecord = serde_json::from_slice(&value)
                .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))?;
            if !super::is_direct_child(&record.name, &collection) {
                continue;
            }
            if filter.matches(|field| match field {
                "filename" => Some(record.filename.clone()),
                "description" => Some(record.description.clone()),
                "mime_type" => Some(record.mime_type.clone()),
                "source_uri" => Some(record.source_uri.clone()),
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
        let page: Vec<SpecRecord> = records.iter().skip(start).take(limit).cloned().collect();
        let next_token = if start + page.len() < records.len() {
            let last = page.last().map(|r| r.name.clone()).unwrap_or_default();
            crate::pagination::encode(&last, parent, filter_expr, page_size)
        } else {
            String::new()
        };
        Ok((page, next_token))
    }

    pub async fn update_api_spec(
        &self,
        name_with_ref: &str,
        filename: String,
        description: String,
        mime_type: String,
        source_uri: String,
        contents: Option<Vec<u8>>,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<SpecRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name_with_ref)?;
        name::parse_spec(base)?;
        if reference != RevisionRef::Current {
            return Err(RegistryError::invalid_argument(
                "update targets the current revision, not a pinned one",
            ));
        }

        let wants = |field: &str| update_mask.is_empty() || update_mask.iter().any(|m| m == field);
        if !self.resource_exists_spec(base).await? {
            if allow_missing {
                let parent_key = name::parse_spec(base)?;
                let mut record = self
                    .create_api_spec(
                        &crate::name::VersionKey {
                            project: parent_key.project,
                            api: parent_key.api,
                            version: parent_key.version,
                        }
                        .canonical(),
                        &parent_key.spec,
                        filename,
                        description,
                        mime_type,
                        source_uri,
                        contents.unwrap_or_default(),
                    )
                    .await?;
                record.name = base.to_string();
                return Ok(record);
            }
            return Err(RegistryError::not_found(format!("resource '{base}' not found")));
        }

        self.spec_engine
            .update(base, move |record| {
                if wants("filename") && !filename.is_empty() {
                    record.filename = filename;
                }
                if wants("description") && !description.is_empty() {
                    record.description = description;
                }
                if wants("mime_type") && !mime_type.is_empty() {
                    record.mime_type = mime_type;
                }
                if wants("source_uri") && !source_uri.is_empty() {
                    record.source_uri = source_uri;
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
            })
            .await
    }

    pub async fn delete_api_spec(&self, name: &str) -> Result<(), RegistryError> {
        name::parse_spec(name)?;
        self.delete_cascade(name).await
    }

    pub async fn list_api_spec_revisions(
        &self,
        name: &str,
        page_size: i32,
        page_token: &str,
    ) -> Result<(Vec<SpecRecord>, String), RegistryError> {
        let (base, _) = revision::split_revision_ref(name)?;
        name::parse_spec(base)?;
        self.spec_engine.list_revisions(base, page_size, page_token).await
    }

    pub async fn tag_api_spec_revision(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<SpecRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_spec(base)?;
        self.spec_engine.tag_revision(base, &reference, tag).await
    }

    pub async fn rollback_api_spec(
        &self,
        name: &str,
        revision_id: &str,
    ) -> Result<SpecRecord, RegistryError> {
        let (base, _) = revision::split_revision_ref(name)?;
        name::parse_spec(base)?;
        self.spec_engine.rollback(base, revision_id).await
    }

    pub async fn delete_api_spec_revision(&self, name: &str) -> Result<(), RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_spec(base)?;
        let revision_id = match reference {
            RevisionRef::Current => {
                return Err(RegistryError::invalid_argument(
                    "revision deletion requires an explicit @id or @tag",
                ))
            }
            RevisionRef::ById(id) => id,
            RevisionRef::ByTag(tag) => {
                self.spec_engine
                    .get(base, &RevisionRef::ByTag(tag))
                    .await?
                    .revision_id
            }
        };
        self.spec_engine.delete_revision(base, &revision_id).await
    }

    async fn resource_exists_spec(&self, base: &str) -> Result<bool, RegistryError> {
        Ok(self
            .storage()
            .get(&crate::keys::resource_key(base))
            .await?
            .is_some())
    }
}

/// Rewrites a response name per the Response-Name Policy (SPEC_FULL.md
/// §4.3): unqualified in, unqualified out; `@id`/`@tag` in, same suffix out.
pub(crate) fn rewrite_response_name(base: &str, reference: &RevisionRef, _revision_id: &str) -> String {
    match reference {
        RevisionRef::Current => base.to_string(),
        RevisionRef::ById(id) => format!("{base}@{id}"),
        RevisionRef::ByTag(tag) => format!("{base}@{tag}"),
    }
}
