//! Deployment resource operations: same revisioned shape as Spec, but
//! parented directly under an Api (SPEC_FULL.md §3.2) with no derived
//! content hash.

use chrono::Utc;

use crate::error::RegistryError;
use crate::model::DeploymentRecord;
use crate::name::{self, DeploymentKey};
use crate::revision::{self, RevisionRef};

use super::{deployment_collection, RegistryService};

impl RegistryService {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_api_deployment(
        &self,
        parent: &str,
        api_deployment_id: &str,
        display_name: String,
        description: String,
        api_spec_revision: String,
        endpoint_uri: String,
        external_channel_uri: String,
        intended_audience: String,
        access_guidance: String,
    ) -> Result<DeploymentRecord, RegistryError> {
        let parent_key = name::parse_api(parent)?;
        name::validate_id(api_deployment_id)?;
        self.require_parent(parent).await?;

        let key = DeploymentKey {
            project: parent_key.project,
            api: parent_key.api,
            deployment: api_deployment_id.to_string(),
        };
        let now = Utc::now();
        let record = DeploymentRecord {
            name: key.canonical(),
            display_name,
            description,
            api_spec_revision,
            endpoint_uri,
            external_channel_uri,
            intended_audience,
            access_guidance,
            create_time: now,
            revision_create_time: now,
            revision_update_time: now,
            revision_id: String::new(),
        };
        self.deployment_engine.create(record).await
    }

    pub async fn get_api_deployment(&self, name: &str) -> Result<DeploymentRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_deployment(base)?;
        let mut record = self.deployment_engine.get(base, &reference).await?;
        record.name = super::spec::rewrite_response_name(base, &reference, &record.revision_id);
        Ok(record)
    }

    pub async fn list_api_deployments(
        &self,
        parent: &str,
        page_size: i32,
        page_token: &str,
        filter_expr: &str,
    ) -> Result<(Vec<DeploymentRecord>, String), RegistryError> {
        name::parse_api(parent)?;
        let filter = crate::filter::Filter::parse(
            filter_expr,
            &[
                "display_name",
                "description",
                "endpoint_uri",
                "external_channel_uri",
                "intended_audience",
            ],
        )?;
        let cursor = crate::pagination::decode(page_token, parent, filter_expr, page_size)?;
        let limit = crate::pagination::normalize_page_size(page_size);

        let collection = deployment_collection(parent);
        let rows = self
            .storage()
            .scan_prefix(&crate::keys::resource_scan_prefix(&collection))
            .await?;
        let mut records: Vec<DeploymentRecord> = Vec::new();
        for (_, value) in rows {
            let record: DeploymentRecord = serde_json::from_slice(&value)
                .map_err(|e| RegistryError::internal(format!("corrupt stored record: {e}")))?;
            if !super::is_direct_child(&record.name, &collection) {
                continue;
            }
            if filter.matches(|field| match field {
                "display_name" => Some(record.display_name.clone()),
                "description" => Some(record.description.clone()),
                "endpoint_uri" => Some(record.endpoint_uri.clone()),
                "external_channel_uri" => Some(record.external_channel_uri.clone()),
                "intended_audience" => Some(record.intended_audience.clone()),
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
        let page: Vec<DeploymentRecord> = records.iter().skip(start).take(limit).cloned().collect();
        let next_token = if start + page.len() < records.len() {
            let last = page.last().map(|r| r.name.clone()).unwrap_or_default();
            crate::pagination::encode(&last, parent, filter_expr, page_size)
        } else {
            String::new()
        };
        Ok((page, next_token))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_api_deployment(
        &self,
        name_with_ref: &str,
        display_name: String,
        description: String,
        api_spec_revision: String,
        endpoint_uri: String,
        external_channel_uri: String,
        intended_audience: String,
        access_guidance: String,
        update_mask: &[String],
        allow_missing: bool,
    ) -> Result<DeploymentRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name_with_ref)?;
        name::parse_deployment(base)?;
        if reference != RevisionRef::Current {
            return Err(RegistryError::invalid_argument(
                "update targets the current revision, not a pinned one",
            ));
        }

        let wants = |field: &str| update_mask.is_empty() || update_mask.iter().any(|m| m == field);
        if self.storage().get(&crate::keys::resource_key(base)).await?.is_none() {
            if allow_missing {
                let parent_key = name::parse_deployment(base)?;
                let mut record = self
                    .create_api_deployment(
                        &crate::name::ApiKey {
                            project: parent_key.project,
                            api: parent_key.api,
                        }
                        .canonical(),
                        &parent_key.deployment,
                        display_name,
                        description,
                        api_spec_revision,
                        endpoint_uri,
                        external_channel_uri,
                        intended_audience,
                        access_guidance,
                    )
                    .await?;
                record.name = base.to_string();
                return Ok(record);
            }
            return Err(RegistryError::not_found(format!("resource '{base}' not found")));
        }

        self.deployment_engine
            .update(base, move |record| {
                if wants("display_name") && !display_name.is_empty() {
                    record.display_name = display_name;
                }
                if wants("description") && !description.is_empty() {
                    record.description = description;
                }
                if wants("api_spec_revision") && !api_spec_revision.is_empty() {
                    record.api_spec_revision = api_spec_revision;
                }
                if wants("endpoint_uri") && !endpoint_uri.is_empty() {
                    record.endpoint_uri = endpoint_uri;
                }
                if wants("external_channel_uri") && !external_channel_uri.is_empty() {
                    record.external_channel_uri = external_channel_uri;
                }
                if wants("intended_audience") && !intended_audience.is_empty() {
                    record.intended_audience = intended_audience;
                }
                if wants("access_guidance") && !access_guidance.is_empty() {
                    record.access_guidance = access_guidance;
                }
            })
            .await
    }

    pub async fn delete_api_deployment(&self, name: &str) -> Result<(), RegistryError> {
        name::parse_deployment(name)?;
        self.delete_cascade(name).await
    }

    pub async fn list_api_deployment_revisions(
        &self,
        name: &str,
        page_size: i32,
        page_token: &str,
    ) -> Result<(Vec<DeploymentRecord>, String), RegistryError> {
        let (base, _) = revision::split_revision_ref(name)?;
        name::parse_deployment(base)?;
        self.deployment_engine
            .list_revisions(base, page_size, page_token)
            .await
    }

    pub async fn tag_api_deployment_revision(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<DeploymentRecord, RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_deployment(base)?;
        self.deployment_engine.tag_revision(base, &reference, tag).await
    }

    pub async fn rollback_api_deployment(
        &self,
        name: &str,
        revision_id: &str,
    ) -> Result<DeploymentRecord, RegistryError> {
        let (base, _) = revision::split_revision_ref(name)?;
        name::parse_deployment(base)?;
        self.deployment_engine.rollback(base, revision_id).await
    }

    pub async fn delete_api_deployment_revision(&self, name: &str) -> Result<(), RegistryError> {
        let (base, reference) = revision::split_revision_ref(name)?;
        name::parse_deployment(base)?;
        let revision_id = match reference {
            RevisionRef::Current => {
                return Err(RegistryError::invalid_argument(
                    "revision deletion requires an explicit @id or @tag",
                ))
            }
            RevisionRef::ById(id) => id,
            RevisionRef::ByTag(tag) => {
                self.deployment_engine
                    .get(base, &RevisionRef::ByTag(tag))
                    .await?
                    .revision_id
            }
        };
        self.deployment_engine.delete_revision(base, &revision_id).await
    }
}
