//! Resource Service: the operation surface of Create/Get/Update/Delete/List
//! for every entity, cascading deletion, pagination, and filter evaluation
//! (SPEC_FULL.md §4.4-§4.6). This is the layer the gRPC transport calls
//! into; it never constructs a `tonic::Status` itself (§7).

pub mod artifact;
pub mod deployment;
pub mod spec;

use std::sync::Arc;

use chrono::Utc;

use crate::engine::RevisionEngine;
use crate::error::RegistryError;
use crate::filter::Filter;
use crate::keys;
use crate::model::{DeploymentRecord, PlainRecord, SpecRecord};
use crate::pagination;
use crate::storage::Storage;

const PLAIN_FILTER_FIELDS: &[&str] = &["display_name", "description"];

/// Whether `full_name` is an immediate child of `parent_name` in the
/// resource-name hierarchy (one path segment deeper, not an arbitrary
/// descendant). List operations must not surface grandchildren.
fn is_direct_child(full_name: &str, parent_name: &str) -> bool {
    full_name
        .strip_prefix(parent_name)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| !rest.contains('/'))
        .unwrap_or(false)
}

/// The name shapes in §3 insert a literal path component between a parent
/// and its children (`locations/global/apis`, `versions`, `specs`,
/// `deployments`, `artifacts`). These helpers build the corresponding scan
/// root so [`RegistryService::list_plain`]'s one-segment "direct child"
/// check lines up with the real hierarchy depth.
pub(crate) fn api_collection(project_name: &str) -> String {
    format!("{project_name}/locations/global/apis")
}

pub(crate) fn version_collection(api_name: &str) -> String {
    format!("{api_name}/versions")
}

pub(crate) fn spec_collection(version_name: &str) -> String {
    format!("{version_name}/specs")
}

pub(crate) fn deployment_collection(api_name: &str) -> String {
    format!("{api_name}/deployments")
}

pub(crate) fn artifact_collection(parent_name: &str) -> String {
    format!("{parent_name}/artifacts")
}

/// Shared state behind every RPC handler: the storage backend and the two
/// revision engines. One instance is constructed at startup and shared via
/// `Arc` across all request tasks (SPEC_FULL.md §5, "Shared mutable state").
#[derive(Clone)]
pub struct RegistryService {
    storage: Arc<dyn Storage>,
    pub(crate) spec_engine: Arc<RevisionEngine<SpecRecord>>,
    pub(crate) deployment_engine: Arc<RevisionEngine<DeploymentRecord>>,
}

impl RegistryService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            spec_engine: Arc::new(RevisionEngine::new(storage.clone())),
            deployment_engine: Arc::new(RevisionEngine::new(storage.clone())),
            storage,
        }
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    async fn resource_exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.storage.get(&keys::resource_key(name)).await?.is_some())
    }

    async fn require_parent(&self, parent_name: &str) -> Result<(), RegistryError> {
        if self.resource_exists(parent_name).await? {
            Ok(())
        } else {
            Err(RegistryError::not_found(format!(
                "parent '{parent_name}' not found"
            )))
        }
    }

    /// Creates a plain (non-revisioned) resource under `parent_name` (`None`
    /// for a Project, which has no parent).
    pub(crate) async fn create_plain(
        &self,
        parent_name: Option<&str>,
        name: String,
        display_name: String,
        description: String,
    ) -> Result<PlainRecord, RegistryError> {
        if let Some(parent) = parent_name {
            self.require_parent(parent).await?;
        }
        let record = PlainRecord::new(name.clone(), display_name, description, Utc::now());
        let bytes = serde_json::to_vec(&record).expect("PlainRecord always serializes");
        let key = keys::resource_key(&name);
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                if txn.get(&key).is_some() {
                    return Err(RegistryError::already_exists(format!(
                        "resource '{name}' already exists"
                    )));
                }
                txn.put(key.clone(), bytes.clone());
                Ok(())
            }))
            .await?;
        Ok(record)
    }

    pub(crate) async fn get_plain(&self, name: &str) -> Result<PlainRecord, RegistryError> {
        let bytes = self
            .storage
            .get(&keys::resource_key(name))
            .await?
            .ok_or_else(|| RegistryError::not_found(format!("resource '{name}' not found")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))
    }

    /// Applies a field-mask update: a field absent from `update_mask` (when
    /// non-empty), or present with an empty-string value, is "no change"
    /// (SPEC_FULL.md §4.4, and the Open Question decision in DESIGN.md).
    pub(crate) async fn update_plain(
        &self,
        name: &str,
        display_name: String,
        description: String,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<PlainRecord, RegistryError> {
        let wants = |field: &str| update_mask.is_empty() || update_mask.iter().any(|m| m == field);

        let existing = self.get_plain(name).await;
        let mut record = match existing {
            Ok(record) => record,
            Err(RegistryError::NotFound(_)) if allow_missing => {
                PlainRecord::new(name.to_string(), String::new(), String::new(), Utc::now())
            }
            Err(e) => return Err(e),
        };

        if wants("display_name") && !display_name.is_empty() {
            record.display_name = display_name;
        }
        if wants("description") && !description.is_empty() {
            record.description = description;
        }
        record.update_time = Utc::now();

        let bytes = serde_json::to_vec(&record).expect("PlainRecord always serializes");
        self.storage
            .put(keys::resource_key(name), bytes)
            .await?;
        Ok(record)
    }

    /// Lists direct children of `parent_scan_name` (the resource-row
    /// prefix), applying `filter` and opaque pagination.
    pub(crate) async fn list_plain(
        &self,
        parent_name: &str,
        page_size: i32,
        page_token: &str,
        filter_expr: &str,
    ) -> Result<(Vec<PlainRecord>, String), RegistryError> {
        let filter = Filter::parse(filter_expr, PLAIN_FILTER_FIELDS)?;
        let cursor = pagination::decode(page_token, parent_name, filter_expr, page_size)?;
        let limit = pagination::normalize_page_size(page_size);

        let rows = self
            .storage
            .scan_prefix(&keys::resource_scan_prefix(parent_name))
            .await?;
        let mut records: Vec<PlainRecord> = Vec::new();
        for (_, value) in rows {
            let record: PlainRecord = serde_json::from_slice(&value)
                .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))?;
            if !is_direct_child(&record.name, parent_name) {
                continue;
            }
            if filter.matches(|field| match field {
                "display_name" => Some(record.display_name.clone()),
                "description" => Some(record.description.clone()),
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
        let page: Vec<PlainRecord> = records.iter().skip(start).take(limit).cloned().collect();
        let next_token = if start + page.len() < records.len() {
            let last = page.last().map(|r| r.name.clone()).unwrap_or_default();
            pagination::encode(&last, parent_name, filter_expr, page_size)
        } else {
            String::new()
        };
        Ok((page, next_token))
    }

    /// Deletes `name` and every descendant (resource rows, revisions, tags)
    /// in one transaction (SPEC_FULL.md §4.6).
    pub(crate) async fn delete_cascade(&self, name: &str) -> Result<(), RegistryError> {
        if !self.resource_exists(name).await? {
            return Err(RegistryError::not_found(format!("resource '{name}' not found")));
        }
        let name = name.to_string();
        self.storage
            .run_in_transaction(Box::new(move |txn| {
                txn.delete(&keys::resource_key(&name));
                for (key, _) in txn.scan_prefix(&keys::resource_scan_prefix(&name)) {
                    txn.delete(&key);
                }
                for (key, _) in txn.scan_prefix(&keys::revision_scan_prefix(&name)) {
                    txn.delete(&key);
                }
                for (key, _) in txn.scan_prefix(&keys::tag_scan_prefix(&name)) {
                    txn.delete(&key);
                }
                for (key, _) in txn.scan_prefix(&keys::revision_scan_prefix_for_descendants(&name)) {
                    txn.delete(&key);
                }
                for (key, _) in txn.scan_prefix(&keys::tag_scan_prefix_for_descendants(&name)) {
                    txn.delete(&key);
                }
                Ok(())
            }))
            .await
    }

    // -- Project -----------------------------------------------------

    pub async fn create_project(
        &self,
        project_id: &str,
        display_name: String,
        description: String,
    ) -> Result<PlainRecord, RegistryError> {
        crate::name::validate_id(project_id)?;
        let name = crate::name::ProjectKey {
            project: project_id.to_string(),
        }
        .canonical();
        self.create_plain(None, name, display_name, description).await
    }

    pub async fn get_project(&self, name: &str) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_project(name)?;
        self.get_plain(name).await
    }

    pub async fn list_projects(
        &self,
        page_size: i32,
        page_token: &str,
        filter: &str,
    ) -> Result<(Vec<PlainRecord>, String), RegistryError> {
        // "projects" is not itself a stored resource; it is simply the
        // common prefix every project name shares, used here as the scan
        // root for the one list operation with no real parent.
        self.list_plain("projects", page_size, page_token, filter).await
    }

    pub async fn update_project(
        &self,
        name: &str,
        display_name: String,
        description: String,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_project(name)?;
        self.update_plain(name, display_name, description, update_mask, allow_missing)
            .await
    }

    pub async fn delete_project(&self, name: &str) -> Result<(), RegistryError> {
        crate::name::parse_project(name)?;
        self.delete_cascade(name).await
    }

    // -- Api -----------------------------------------------------------

    pub async fn create_api(
        &self,
        parent: &str,
        api_id: &str,
        display_name: String,
        description: String,
    ) -> Result<PlainRecord, RegistryError> {
        let parent_key = crate::name::parse_project(parent)?;
        crate::name::validate_id(api_id)?;
        let name = crate::name::ApiKey {
            project: parent_key.project,
            api: api_id.to_string(),
        }
        .canonical();
        self.create_plain(Some(parent), name, display_name, description).await
    }

    pub async fn get_api(&self, name: &str) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_api(name)?;
        self.get_plain(name).await
    }

    pub async fn list_apis(
        &self,
        parent: &str,
        page_size: i32,
        page_token: &str,
        filter: &str,
    ) -> Result<(Vec<PlainRecord>, String), RegistryError> {
        crate::name::parse_project(parent)?;
        self.list_plain(&api_collection(parent), page_size, page_token, filter)
            .await
    }

    pub async fn update_api(
        &self,
        name: &str,
        display_name: String,
        description: String,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_api(name)?;
        self.update_plain(name, display_name, description, update_mask, allow_missing)
            .await
    }

    pub async fn delete_api(&self, name: &str) -> Result<(), RegistryError> {
        crate::name::parse_api(name)?;
        self.delete_cascade(name).await
    }

    // -- ApiVersion ------------------------------------------------------

    pub async fn create_api_version(
        &self,
        parent: &str,
        api_version_id: &str,
        display_name: String,
        description: String,
    ) -> Result<PlainRecord, RegistryError> {
        let parent_key = crate::name::parse_api(parent)?;
        crate::name::validate_id(api_version_id)?;
        let name = crate::name::VersionKey {
            project: parent_key.project,
            api: parent_key.api,
            version: api_version_id.to_string(),
        }
        .canonical();
        self.create_plain(Some(parent), name, display_name, description).await
    }

    pub async fn get_api_version(&self, name: &str) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_version(name)?;
        self.get_plain(name).await
    }

    pub async fn list_api_versions(
        &self,
        parent: &str,
        page_size: i32,
        page_token: &str,
        filter: &str,
    ) -> Result<(Vec<PlainRecord>, String), RegistryError> {
        crate::name::parse_api(parent)?;
        self.list_plain(&version_collection(parent), page_size, page_token, filter)
            .await
    }

    pub async fn update_api_version(
        &self,
        name: &str,
        display_name: String,
        description: String,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<PlainRecord, RegistryError> {
        crate::name::parse_version(name)?;
        self.update_plain(name, display_name, description, update_mask, allow_missing)
            .await
    }

    pub async fn delete_api_version(&self, name: &str) -> Result<(), RegistryError> {
        crate::name::parse_version(name)?;
        self.delete_cascade(name).await
    }
}
